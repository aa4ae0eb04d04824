//! Price lookup client. One fetch per distinct symbol per tick; every
//! failure mode (network, non-2xx, malformed body, unparseable price)
//! collapses to `Quote::Unavailable` for that symbol only so a bad feed
//! can never abort a tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// One symbol's last traded price, owned by a single tick. Never cached
/// across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Tagged lookup result. The quote source is duck-typed JSON; rather than
/// propagating parse errors we model "no usable price" explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Quote {
    Available(PriceQuote),
    Unavailable,
}

impl Quote {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            Self::Available(quote) => Some(quote.price),
            Self::Unavailable => None,
        }
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync + 'static {
    /// Fetches the latest traded price for `symbol`. Infallible by
    /// construction: failures are `Quote::Unavailable`.
    async fn latest(&self, symbol: &str) -> Quote;
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

/// Pull-based HTTP quote source (`GET {base}/api/v3/ticker/price?symbol=`).
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPriceSource {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    async fn fetch(&self, symbol: &str) -> Result<TickerResponse, reqwest::Error> {
        let mut url = self.base_url.clone();
        url.set_path("/api/v3/ticker/price");

        self.client
            .get(url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json::<TickerResponse>()
            .await
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn latest(&self, symbol: &str) -> Quote {
        let body = match self.fetch(symbol).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Price fetch failed for {symbol}: {e}");
                return Quote::Unavailable;
            }
        };

        let Ok(price) = Decimal::from_str(&body.price) else {
            warn!("Unparseable price {:?} for {symbol}", body.price);
            return Quote::Unavailable;
        };

        if price <= Decimal::ZERO {
            warn!("Non-positive price {price} for {symbol}");
            return Quote::Unavailable;
        }

        debug!("Fetched price for {symbol}: {price}");

        Quote::Available(PriceQuote {
            symbol: symbol.to_string(),
            price,
            fetched_at: Utc::now(),
        })
    }
}
