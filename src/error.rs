//! Domain-specific error types following clean error handling architecture.
//! Separates repository, evaluation, and scheduling concerns instead of
//! funnelling everything through one opaque error.

/// Database persistence and data corruption errors raised by the order
/// repository gateway.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Malformed order row {id}: {reason}")]
    MalformedRow { id: i64, reason: String },
}

/// Scheduler lifecycle and tick-level errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler already started in this process")]
    AlreadyStarted,
    #[error("Order repository error: {0}")]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}
