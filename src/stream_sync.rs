//! External stream-status sync. A periodic job that shares the scheduling
//! host with the order engine but has no data dependency on it: its own
//! interval, its own task, and failures that never reach the order loop.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use url::Url;

pub struct StreamSync {
    client: reqwest::Client,
    endpoint: Url,
    sync_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StreamSync {
    pub fn new(
        endpoint: Url,
        sync_interval: Duration,
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            sync_interval,
            shutdown,
        })
    }

    pub async fn run(mut self) {
        info!(
            "Starting stream status sync with interval {:?}",
            self.sync_interval
        );

        let mut ticker = interval(self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!("Stream status sync failed: {e}");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown requested, stopping stream sync");
                        break;
                    }
                }
            }
        }
    }

    async fn sync_once(&self) -> Result<(), reqwest::Error> {
        self.client
            .post(self.endpoint.clone())
            .send()
            .await?
            .error_for_status()?;

        debug!("Stream status sync completed");
        Ok(())
    }
}
