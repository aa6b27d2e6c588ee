//! Job service error types.

use thiserror::Error;

use trender_queue::QueueError;
use trender_store::StoreError;

pub type JobsResult<T> = Result<T, JobsError>;

/// Transport-level failures. A job that simply does not exist is never an
/// error: lookups return `Ok(None)` and cancel/retry return `Ok(false)`.
#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Invalid filters: {0}")]
    InvalidFilters(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl JobsError {
    pub fn invalid_filters(msg: impl Into<String>) -> Self {
        Self::InvalidFilters(msg.into())
    }

    /// True when a queue engine could not be reached.
    pub fn is_unavailable(&self) -> bool {
        match self {
            JobsError::Queue(e) => e.is_unavailable(),
            JobsError::Store(e) => e.is_retryable(),
            JobsError::InvalidFilters(_) => false,
        }
    }
}
