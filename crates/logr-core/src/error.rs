//! Error types for logr.

use thiserror::Error;

/// Result type alias using logr's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for logr operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Known domain rule violated (bad level, bad event type, oversize content)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Log entry not found
    #[error("Log entry not found: {0}")]
    LogNotFound(uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not authorized for this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Per-key request quota exceeded; payload is seconds until the window opens
    #[error("Rate limited: retry after {0}s")]
    RateLimited(u64),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("invalid log level: banana".to_string());
        assert_eq!(err.to_string(), "Validation error: invalid log level: banana");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("trace abc".to_string());
        assert_eq!(err.to_string(), "Not found: trace abc");
    }

    #[test]
    fn test_error_display_log_not_found() {
        let id = Uuid::nil();
        let err = Error::LogNotFound(id);
        assert_eq!(err.to_string(), format!("Log entry not found: {}", id));
    }

    #[test]
    fn test_error_display_rate_limited() {
        let err = Error::RateLimited(42);
        assert_eq!(err.to_string(), "Rate limited: retry after 42s");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("invalid API key".to_string());
        assert_eq!(err.to_string(), "Unauthorized: invalid API key");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("write scope required".to_string());
        assert_eq!(err.to_string(), "Forbidden: write scope required");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(7)
        }
        assert_eq!(get_result().unwrap(), 7);
    }
}
