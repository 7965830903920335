//! Error taxonomy of the aggregation services.

use crate::db::repository::RepositoryError;

/// Result type for aggregation operations
pub type StatisticsResult<T> = Result<T, StatisticsError>;

/// Error type for aggregation operations
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    /// A referenced individual or document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The referenced entity exists but lacks an attribute the computation needs.
    #[error("Missing attribute '{attribute}' on {entity}")]
    MissingAttribute { entity: String, attribute: &'static str },

    /// The caller asked for something outside the supported domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Statistics were requested over zero records.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl StatisticsError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StatisticsError::Repository(err) => err.is_retryable(),
            _ => false,
        }
    }
}
