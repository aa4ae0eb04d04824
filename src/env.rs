use clap::Parser;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::Level;
use url::Url;

use crate::scheduler::SchedulerConfig;

#[derive(clap::ValueEnum, Debug, Clone)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct Env {
    #[clap(long = "db", env)]
    pub database_url: String,
    #[clap(long, env, default_value = "info")]
    pub log_level: LogLevel,
    /// Explicit opt-in: the scheduler never starts unless enabled, so a
    /// stray non-production process cannot double-execute orders.
    #[clap(long, env, default_value = "false")]
    pub scheduler_enabled: bool,
    /// Base URL of the external execution command endpoint.
    #[clap(long, env)]
    pub execution_base_url: Url,
    /// Shared secret authenticating dispatcher calls to the execution command.
    #[clap(long, env)]
    pub execution_shared_secret: String,
    /// Base URL of the market-data quote endpoint.
    #[clap(long, env)]
    pub market_data_base_url: Url,
    /// Seconds between order scan ticks.
    #[clap(long, env, default_value = "30")]
    pub order_scan_interval: u64,
    /// Maximum jitter in milliseconds before each dispatch within a tick.
    #[clap(long, env, default_value = "500")]
    pub dispatch_max_jitter_ms: u64,
    /// Timeout in seconds for execution command calls.
    #[clap(long, env, default_value = "30")]
    pub execution_timeout: u64,
    /// Timeout in seconds for quote fetches.
    #[clap(long, env, default_value = "5")]
    pub quote_timeout: u64,
    /// Stream status sync endpoint; the sync job only runs when set.
    #[clap(long, env)]
    pub stream_sync_url: Option<Url>,
    /// Seconds between stream status sync runs.
    #[clap(long, env, default_value = "3")]
    pub stream_sync_interval: u64,
}

impl Env {
    pub async fn get_sqlite_pool(&self) -> Result<SqlitePool, sqlx::Error> {
        SqlitePool::connect(&self.database_url).await
    }

    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.order_scan_interval),
            max_dispatch_jitter: Duration::from_millis(self.dispatch_max_jitter_ms),
        }
    }

    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout)
    }

    pub const fn quote_timeout(&self) -> Duration {
        Duration::from_secs(self.quote_timeout)
    }

    pub const fn stream_sync_interval(&self) -> Duration {
        Duration::from_secs(self.stream_sync_interval)
    }
}

pub fn setup_tracing(env: &Env) {
    let level: Level = (&env.log_level).into();
    let default_filter = format!("trigger_engine={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .compact()
        .init();
}
