//! Centralized error types for the shared library.
//!
//! Every error carries a retryability classification so callers holding a
//! [`RetryPolicy`](crate::RetryPolicy) can decide whether another attempt
//! makes sense.

use crate::retry::Retryable;
use thiserror::Error;

/// Common error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP client could not be built or a request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service is temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Invalid input provided (bad configuration value, malformed env var)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Tracing subscriber could not be installed
    #[error("Tracing initialization failed: {0}")]
    Tracing(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// assert!(PlatformError::unavailable("vault sealed").is_retryable());
    /// assert!(!PlatformError::invalid_input("VAULT_ADDR").is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::InvalidInput(_) | Self::Tracing(_) => false,
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl Retryable for PlatformError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(PlatformError::unavailable("test").is_retryable());
        assert!(PlatformError::Timeout("test".to_string()).is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!PlatformError::invalid_input("test").is_retryable());
        assert!(!PlatformError::Tracing("already set".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = PlatformError::invalid_input("VAULT_RENEWAL_FRACTION: not a number");
        assert_eq!(
            err.to_string(),
            "Invalid input: VAULT_RENEWAL_FRACTION: not a number"
        );
    }
}
