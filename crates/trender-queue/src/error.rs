//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Corrupt job record {id}: {reason}")]
    CorruptJob { id: String, reason: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn corrupt_job(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptJob {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True when the queue engine could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) | QueueError::Unavailable(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
            }
            _ => false,
        }
    }
}
