//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Default wait when Firestore rate limits without a usable Retry-After.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Errors that can occur while reading or writing the store of record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_MS),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            StoreError::AuthError(_) => Some(401),
            StoreError::PermissionDenied(_) => Some(403),
            StoreError::NotFound(_) => Some(404),
            StoreError::AlreadyExists(_) => Some(409),
            StoreError::RateLimited(_) => Some(429),
            StoreError::ServerError(code, _) => Some(*code),
            StoreError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            StoreError::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Network(_) | StoreError::RateLimited(_) | StoreError::ServerError(_, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(StoreError::from_http_status(429, "slow down"), StoreError::RateLimited(_)));
        assert!(matches!(StoreError::from_http_status(503, "unavailable"), StoreError::ServerError(503, _)));
        assert!(matches!(StoreError::from_http_status(400, "bad"), StoreError::RequestFailed(_)));
        assert!(matches!(StoreError::from_http_status(404, "gone"), StoreError::NotFound(_)));
        assert!(matches!(StoreError::from_http_status(409, "dup"), StoreError::AlreadyExists(_)));
        assert!(matches!(StoreError::from_http_status(403, "no"), StoreError::PermissionDenied(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(StoreError::from_http_status(500, "boom").is_retryable());
        assert!(StoreError::from_http_status(429, "slow down").is_retryable());
        assert!(!StoreError::from_http_status(400, "bad").is_retryable());
        assert!(!StoreError::from_http_status(404, "gone").is_retryable());
        assert!(!StoreError::auth_error("expired").is_retryable());
    }

    #[test]
    fn test_status_and_retry_after() {
        assert_eq!(StoreError::RateLimited(2500).http_status(), Some(429));
        assert_eq!(StoreError::RateLimited(2500).retry_after_ms(), Some(2500));
        assert_eq!(StoreError::ServerError(502, "bad gateway".into()).http_status(), Some(502));
        assert_eq!(StoreError::ServerError(502, "bad gateway".into()).retry_after_ms(), None);
        assert_eq!(StoreError::invalid_response("x").http_status(), None);
    }
}
