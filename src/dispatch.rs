//! Execution dispatch. The external execution command owns all status
//! transitions and is idempotent at the storage layer ("update only if
//! status = watching"), so this client never mutates local state and is
//! safe to call again for an order whose previous attempt had an unknown
//! outcome.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Execution request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Execution endpoint returned {status}: {detail}")]
    Endpoint { status: u16, detail: String },
}

/// Result of one execution command call. `ok` with a detail such as
/// "already executed" is the idempotent no-op outcome for repeat calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionOutcome {
    pub ok: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

#[async_trait]
pub trait ExecutionDispatcher: Send + Sync + 'static {
    async fn execute_scheduled(
        &self,
        order_id: i64,
        observed_price: Option<Decimal>,
    ) -> Result<ExecutionOutcome, DispatchError>;

    async fn execute_tpsl(
        &self,
        order_id: i64,
        observed_price: Decimal,
    ) -> Result<ExecutionOutcome, DispatchError>;
}

#[derive(Debug, Serialize)]
struct ExecutionRequest {
    order_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    observed_price: Option<Decimal>,
}

/// HTTP client for the remote execution command, authenticated with a
/// shared secret.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: Url,
    shared_secret: String,
}

impl HttpDispatcher {
    pub fn new(
        base_url: Url,
        shared_secret: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            shared_secret,
        })
    }

    async fn post(
        &self,
        path: &str,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let mut url = self.base_url.clone();
        url.set_path(path);

        debug!("Dispatching execution for order {}", request.order_id);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.shared_secret)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DispatchError::Endpoint {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.json::<ExecutionOutcome>().await?)
    }
}

#[async_trait]
impl ExecutionDispatcher for HttpDispatcher {
    async fn execute_scheduled(
        &self,
        order_id: i64,
        observed_price: Option<Decimal>,
    ) -> Result<ExecutionOutcome, DispatchError> {
        self.post(
            "/functions/execute-scheduled-order",
            &ExecutionRequest {
                order_id,
                observed_price,
            },
        )
        .await
    }

    async fn execute_tpsl(
        &self,
        order_id: i64,
        observed_price: Decimal,
    ) -> Result<ExecutionOutcome, DispatchError> {
        self.post(
            "/functions/execute-tpsl-order",
            &ExecutionRequest {
                order_id,
                observed_price: Some(observed_price),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn dispatcher_for(server: &MockServer) -> HttpDispatcher {
        let base_url = Url::parse(&server.base_url()).unwrap();
        HttpDispatcher::new(base_url, "test_secret".to_string(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn executes_scheduled_order_with_observed_price() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/functions/execute-scheduled-order")
                .header("authorization", "Bearer test_secret")
                .json_body(json!({"order_id": 42, "observed_price": "50000"}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"ok": true}));
        });

        let outcome = dispatcher_for(&server)
            .execute_scheduled(42, Some(dec!(50000)))
            .await
            .unwrap();

        mock.assert();
        assert!(outcome.ok);
        assert_eq!(outcome.detail, None);
    }

    #[tokio::test]
    async fn time_mode_dispatch_omits_observed_price() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/functions/execute-scheduled-order")
                .json_body(json!({"order_id": 7}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"ok": true, "detail": "executed"}));
        });

        let outcome = dispatcher_for(&server)
            .execute_scheduled(7, None)
            .await
            .unwrap();

        mock.assert();
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn repeat_call_is_idempotent_no_op() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/functions/execute-tpsl-order");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"ok": true, "detail": "already executed"}));
        });

        let dispatcher = dispatcher_for(&server);

        let first = dispatcher.execute_tpsl(9, dec!(101.5)).await.unwrap();
        let second = dispatcher.execute_tpsl(9, dec!(101.5)).await.unwrap();

        assert_eq!(mock.hits(), 2);
        assert_eq!(first, second);
        assert!(second.ok);
        assert_eq!(second.detail.as_deref(), Some("already executed"));
    }

    #[tokio::test]
    async fn business_rule_rejection_is_not_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/functions/execute-scheduled-order");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"ok": false, "detail": "order already claimed"}));
        });

        let outcome = dispatcher_for(&server)
            .execute_scheduled(13, None)
            .await
            .unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.detail.as_deref(), Some("order already claimed"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_endpoint_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/functions/execute-tpsl-order");
            then.status(503).body("maintenance");
        });

        let err = dispatcher_for(&server)
            .execute_tpsl(5, dec!(100))
            .await
            .unwrap_err();

        match err {
            DispatchError::Endpoint { status, detail } => {
                assert_eq!(status, 503);
                assert_eq!(detail, "maintenance");
            }
            DispatchError::Http(_) => panic!("expected endpoint error"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let base_url = Url::parse("http://127.0.0.1:1/").unwrap();
        let dispatcher =
            HttpDispatcher::new(base_url, "secret".to_string(), Duration::from_millis(200))
                .unwrap();

        let err = dispatcher.execute_scheduled(1, None).await.unwrap_err();
        assert!(matches!(err, DispatchError::Http(_)));
    }
}
