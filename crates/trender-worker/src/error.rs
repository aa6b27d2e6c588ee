//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] trender_pipeline::PipelineError),

    #[error("Queue error: {0}")]
    Queue(#[from] trender_queue::QueueError),

    #[error("Store error: {0}")]
    Store(#[from] trender_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] trender_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Pipeline(e) => e.is_retryable(),
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Queue(_) | WorkerError::Storage(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this is a permanent failure that should NOT be retried.
    ///
    /// The queue moves these straight to `failed` without spending the
    /// remaining attempts.
    pub fn is_permanent_failure(&self) -> bool {
        match self {
            WorkerError::Pipeline(e) => e.is_permanent(),
            WorkerError::InvalidPayload(_) | WorkerError::ConfigError(_) => true,
            _ => false,
        }
    }

    /// Message stored on the failed job and its durable record.
    pub fn job_message(&self) -> String {
        match self {
            WorkerError::Pipeline(e) => e.reel_message(),
            other => other.to_string(),
        }
    }
}
