use backon::{ConstantBuilder, Retryable};
use tokio::sync::watch;
use tracing::{error, info, warn};

pub mod dispatch;
pub mod env;
pub mod error;
pub mod order;
pub mod quote;
pub mod scheduler;
pub mod store;
pub mod stream_sync;
pub mod trigger;

use crate::dispatch::HttpDispatcher;
use crate::env::Env;
use crate::quote::HttpPriceSource;
use crate::scheduler::Scheduler;
use crate::store::SqliteOrderStore;
use crate::stream_sync::StreamSync;

const DB_CONNECT_RETRY_DELAY_SECS: u64 = 5;
const DB_CONNECT_MAX_RETRIES: usize = 5;

pub async fn run(env: Env) -> anyhow::Result<()> {
    let connect = || async { env.get_sqlite_pool().await };
    let pool = connect
        .retry(
            ConstantBuilder::default()
                .with_delay(std::time::Duration::from_secs(DB_CONNECT_RETRY_DELAY_SECS))
                .with_max_times(DB_CONNECT_MAX_RETRIES),
        )
        .notify(|e, duration| {
            warn!("Database connection failed ({e}), retrying in {duration:?}");
        })
        .await?;

    sqlx::migrate!().run(&pool).await?;

    if !env.scheduler_enabled {
        warn!("Scheduler disabled (set SCHEDULER_ENABLED=true to run); exiting");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = SqliteOrderStore::new(pool);
    let prices = HttpPriceSource::new(env.market_data_base_url.clone(), env.quote_timeout())?;
    let dispatcher = HttpDispatcher::new(
        env.execution_base_url.clone(),
        env.execution_shared_secret.clone(),
        env.execution_timeout(),
    )?;

    let scheduler = Scheduler::new(
        env.scheduler_config(),
        store,
        prices,
        dispatcher,
        shutdown_rx.clone(),
    );
    let mut scheduler_task = tokio::spawn(scheduler.start());

    let sync_task = match &env.stream_sync_url {
        Some(endpoint) => {
            let sync = StreamSync::new(
                endpoint.clone(),
                env.stream_sync_interval(),
                env.quote_timeout(),
                shutdown_rx,
            )?;
            Some(tokio::spawn(sync.run()))
        }
        None => None,
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, shutting down gracefully...");
            let _ = shutdown_tx.send(true);

            match scheduler_task.await {
                Ok(Ok(())) => info!("Scheduler stopped"),
                Ok(Err(e)) => error!("Scheduler failed during shutdown: {e}"),
                Err(e) => error!("Scheduler task panicked: {e}"),
            }
        }

        result = &mut scheduler_task => {
            match result {
                Ok(Ok(())) => info!("Scheduler stopped"),
                Ok(Err(e)) => error!("Scheduler failed: {e}"),
                Err(e) => error!("Scheduler task panicked: {e}"),
            }
            let _ = shutdown_tx.send(true);
        }
    }

    if let Some(task) = sync_task {
        let _ = task.await;
    }

    info!("Shutdown complete");
    Ok(())
}
