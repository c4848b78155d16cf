//! Centralized HTTP client configuration and building.
//!
//! Certificate verification is on unless the caller opts out explicitly with
//! [`HttpConfig::with_insecure_tls`]. A handshake failure is reported as an
//! error and never retried without verification.

use crate::PlatformError;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::warn;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout (default: 30s). Must be non-zero.
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// Skip server certificate verification
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("auth-platform-vault/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    /// Set the request timeout. The connect timeout never exceeds it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = self.connect_timeout.min(timeout);
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Skip TLS certificate verification when `insecure` is true.
    #[must_use]
    pub const fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.accept_invalid_certs = insecure;
        self
    }
}

/// Build a configured HTTP client with rustls and connection pooling.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] for a zero timeout and
/// [`PlatformError::Http`] when the TLS backend cannot be initialised.
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_timeout(Duration::from_secs(5));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    if config.timeout.is_zero() {
        return Err(PlatformError::invalid_input("HTTP request timeout must be non-zero"));
    }

    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls();

    if config.accept_invalid_certs {
        warn!("TLS certificate verification disabled by configuration");
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}
