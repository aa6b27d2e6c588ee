//! Pipeline error types.

use thiserror::Error;

use trender_storage::StorageError;
use trender_store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{stage} failed: {message}")]
    StageFailure { stage: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn stage_failure(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Human-readable message recorded on the reel.
    pub fn reel_message(&self) -> String {
        match self {
            PipelineError::StageFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Check if the queue may retry the job that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::StageFailure { .. } | PipelineError::Storage(_) => true,
            PipelineError::Store(e) => !matches!(e, StoreError::NotFound(_)),
            PipelineError::NotFound(_) | PipelineError::PreconditionFailed(_) => false,
        }
    }

    /// Check if this is a permanent failure that should skip remaining attempts.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PipelineError::NotFound(_)
                | PipelineError::PreconditionFailed(_)
                | PipelineError::Store(StoreError::NotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_is_permanent() {
        let err = PipelineError::precondition("Reel r1 has no video file");
        assert!(err.is_permanent());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_stage_failure_is_retryable() {
        let err = PipelineError::stage_failure("download", "scraper returned 502");
        assert!(err.is_retryable());
        assert!(!err.is_permanent());
        assert_eq!(err.reel_message(), "scraper returned 502");
        assert_eq!(err.to_string(), "download failed: scraper returned 502");
    }

    #[test]
    fn test_missing_document_is_permanent() {
        let err = PipelineError::from(StoreError::not_found("reels/r1"));
        assert!(err.is_permanent());
    }
}
