//! Error types for the profile subsystem

use thiserror::Error;

/// Errors raised by profile storage, lookup and analytics
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Input rejected at the boundary (missing user id, oversized name, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid phone number")]
    InvalidPhone,

    #[error("batch size {size} exceeds maximum of {max} phones")]
    BatchTooLarge { size: usize, max: usize },

    /// Circuit breaker is open, the backend is not being called
    #[error("profile cache unavailable")]
    CacheUnavailable,

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// Transient backend failure (connection reset, server error, ...)
    #[error("store error: {0}")]
    Store(String),

    /// A stored record exists but cannot be decoded
    #[error("corrupted data at {key}: {message}")]
    CorruptedData { key: String, message: String },

    #[error("no platform user for this phone")]
    PhoneNotFound,

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("messenger error: {0}")]
    Messenger(String),

    #[error("monitoring error: {0}")]
    Monitoring(String),
}

impl ProfileError {
    /// Whether this error means the backend itself misbehaved.
    ///
    /// Only these count against the circuit breaker. Corrupted records and
    /// validation failures come from a backend that answered correctly.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            ProfileError::Store(_) | ProfileError::Timeout { .. } | ProfileError::CacheUnavailable
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProfileError::Validation(_)
                | ProfileError::InvalidPhone
                | ProfileError::BatchTooLarge { .. }
        )
    }
}

impl From<redis::RedisError> for ProfileError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            ProfileError::Timeout {
                operation: "redis command",
            }
        } else {
            ProfileError::Store(e.to_string())
        }
    }
}

pub type ProfileResult<T> = Result<T, ProfileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_failure_classification() {
        assert!(ProfileError::Store("reset".into()).is_backend_failure());
        assert!(ProfileError::Timeout { operation: "get" }.is_backend_failure());
        assert!(!ProfileError::CorruptedData {
            key: "profile:user:1".into(),
            message: "eof".into()
        }
        .is_backend_failure());
        assert!(!ProfileError::Validation("bad".into()).is_backend_failure());
    }

    #[test]
    fn test_batch_too_large_message() {
        let err = ProfileError::BatchTooLarge { size: 101, max: 100 };
        assert_eq!(err.to_string(), "batch size 101 exceeds maximum of 100 phones");
        assert!(err.is_validation());
    }
}
