//! Vault error types using thiserror 2.0.
//!
//! One error type per layer: [`TransportError`] for the HTTP exchange,
//! [`AuthError`] for login, [`RenewalError`] for the renewer, and
//! [`VaultError`] for everything the public client returns.

use rust_common::{PlatformError, Retryable};
use thiserror::Error;

/// Upper bound on how much of a Vault error body is kept in an error.
const MAX_BODY_LEN: usize = 512;

/// Statuses worth another attempt: request timeout, throttling, server errors.
const fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Failure of a single HTTP exchange with Vault.
#[derive(Error, Debug)]
pub enum TransportError {
    /// TCP connect or TLS handshake failed
    #[error("connection to Vault failed: {0}")]
    Connect(#[source] reqwest::Error),

    /// The request exceeded the configured timeout
    #[error("request to Vault timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Vault answered with a non-2xx status
    #[error("Vault returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Token contains bytes that cannot go into an HTTP header
    #[error("token is not a valid header value")]
    InvalidToken,

    /// Any other client-side failure (body read, redirect loop, ...)
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
}

impl TransportError {
    /// Build a status error, truncating the body.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_BODY_LEN {
            let cut = (0..=MAX_BODY_LEN)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Self::Status { status, body }
    }

    /// HTTP status, when Vault answered at all.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Http(e) => e.is_body() || e.is_request(),
            Self::InvalidToken => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else if err.is_connect() {
            Self::Connect(err)
        } else {
            Self::Http(err)
        }
    }
}

/// Failure of an AppRole login.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Vault refused the credential (any non-2xx status)
    #[error("login rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Response body was not a Vault auth response
    #[error("login response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    /// Response had no auth section or no client token
    #[error("login response carried an empty credential")]
    EmptyCredential,

    /// Response carried a token with an unusable lease
    #[error("login response carried an invalid lease: {0}")]
    InvalidLease(String),

    /// Vault could not be reached
    #[error(transparent)]
    Transport(TransportError),
}

impl AuthError {
    /// Stable, machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Decode(_) => "decode failure",
            Self::EmptyCredential => "empty credential",
            Self::InvalidLease(_) => "invalid lease",
            Self::Transport(_) => "transport",
        }
    }

    /// HTTP status of a rejected login.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if another login attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => is_transient_status(*status),
            Self::Transport(e) => e.is_retryable(),
            Self::Decode(_) | Self::EmptyCredential | Self::InvalidLease(_) => false,
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { status, body } => Self::Rejected { status, body },
            other => Self::Transport(other),
        }
    }
}

/// Outcome of a failed renewal attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    /// Worth retrying: network trouble, throttling, server error
    #[error("transient renewal failure: {0}")]
    Transient(String),

    /// Vault refused to renew: lease revoked, unknown or not renewable
    #[error("renewal rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The lease was issued without the renewable flag
    #[error("lease is not renewable")]
    NotRenewable,

    /// The lease reached its absolute expiry before a renewal succeeded
    #[error("lease expired before it could be renewed")]
    Expired,
}

impl RenewalError {
    /// Terminal errors end the renewer; transient ones are retried.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Transient(_))
    }
}

impl From<TransportError> for RenewalError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { status, body } if !is_transient_status(status) => {
                Self::Rejected { status, body }
            }
            other => Self::Transient(other.to_string()),
        }
    }
}

/// Vault client errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// HTTP exchange failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Login failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Renewal failed terminally
    #[error("Lease renewal failed: {0}")]
    Renewal(#[from] RenewalError),

    /// No live lease in the credential store
    #[error("Not authenticated: no live Vault token")]
    NotAuthenticated,

    /// Secret not found
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Check if error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Auth(e) => e.is_retryable(),
            Self::Platform(e) => e.is_retryable(),
            Self::Renewal(_)
            | Self::NotAuthenticated
            | Self::SecretNotFound(_)
            | Self::InvalidConfig(_)
            | Self::Serialization(_) => false,
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl Retryable for VaultError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_reasons() {
        let rejected = AuthError::from(TransportError::status(403, "permission denied"));
        assert_eq!(rejected.reason(), "rejected");
        assert_eq!(rejected.status(), Some(403));
        assert_eq!(AuthError::EmptyCredential.reason(), "empty credential");
        assert_eq!(AuthError::EmptyCredential.status(), None);
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(TransportError::status(503, "sealed").is_retryable());
        assert!(TransportError::status(429, "").is_retryable());
        assert!(TransportError::status(408, "").is_retryable());
        assert!(!TransportError::status(403, "").is_retryable());
        assert!(!TransportError::status(400, "").is_retryable());
    }

    #[test]
    fn test_renewal_classification() {
        let revoked = RenewalError::from(TransportError::status(403, "permission denied"));
        assert!(revoked.is_terminal());
        assert!(matches!(revoked, RenewalError::Rejected { status: 403, .. }));

        let sealed = RenewalError::from(TransportError::status(503, "Vault is sealed"));
        assert!(!sealed.is_terminal());

        let timed_out = RenewalError::from(TransportError::status(408, "request timeout"));
        assert!(!timed_out.is_terminal());
        assert!(matches!(timed_out, RenewalError::Transient(_)));
        assert!(AuthError::from(TransportError::status(408, "")).is_retryable());

        assert!(RenewalError::Expired.is_terminal());
        assert!(RenewalError::NotRenewable.is_terminal());
    }

    #[test]
    fn test_status_body_truncated() {
        let err = TransportError::status(500, "é".repeat(600));
        let TransportError::Status { body, .. } = err else {
            panic!("expected status error");
        };
        assert!(body.len() <= MAX_BODY_LEN);
    }

    #[test]
    fn test_vault_error_retryable() {
        let err = VaultError::from(AuthError::from(TransportError::status(502, "")));
        assert!(err.is_retryable());
        assert!(!VaultError::NotAuthenticated.is_retryable());
        assert!(!VaultError::from(RenewalError::Expired).is_retryable());
    }
}
