use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store query error: {0}")]
    Query(String),

    #[error("store serialization error: {0}")]
    Serialization(String),

    #[error("store call timed out")]
    Timeout,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache call timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher connection error: {0}")]
    Connection(String),

    #[error("event serialization error: {0}")]
    Serialization(String),

    #[error("publish timed out")]
    Timeout,
}

/// Errors surfaced by the analytics orchestrator. The kind of the
/// underlying collaborator failure is preserved.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("invalid log: {0}")]
    Validation(String),

    #[error("failed to persist: {0}")]
    Persistence(#[from] StoreError),

    /// `persisted` is set when a log was written before the publish failed.
    #[error("failed to publish event: {source}")]
    EventPublish {
        #[source]
        source: PublishError,
        persisted: bool,
    },

    #[error("failed to trigger analysis: {0}")]
    AnalysisTrigger(#[source] PublishError),
}

impl AnalyticsError {
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when a log was written but the downstream pipeline was not notified.
    pub fn is_partial_success(&self) -> bool {
        matches!(
            self,
            Self::EventPublish {
                persisted: true,
                ..
            }
        )
    }
}
