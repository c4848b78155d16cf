//! HTTP transport to the Vault server.

use crate::config::VaultConfig;
use crate::error::{TransportError, VaultResult};
use reqwest::header::HeaderValue;
use reqwest::{Client, Method, Response};
use rust_common::build_http_client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

/// Header carrying the Vault token.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Issues requests against the configured Vault address.
///
/// The caller picks the token for each request. Every request carries the
/// configured timeout. Non-2xx responses are turned into
/// [`TransportError::Status`]; nothing is retried here.
#[derive(Debug)]
pub struct Transport {
    http: Client,
    addr: String,
}

impl Transport {
    /// Build the transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Platform`](crate::VaultError::Platform) when the
    /// HTTP client cannot be built.
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        let http = build_http_client(&config.http_config())?;
        Ok(Self {
            http,
            addr: config.addr.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for `path` (`/v1/...`; a missing leading slash is added).
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.addr)
        } else {
            format!("{}/{path}", self.addr)
        }
    }

    /// Send a request carrying `token`, or no token at all.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection/TLS failure, timeout, or a
    /// non-2xx status.
    #[instrument(skip(self, body, token), fields(method = %method))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&SecretString>,
    ) -> Result<Response, TransportError> {
        let mut request = self.http.request(method, self.url(path));

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token.expose_secret())
                .map_err(|_| TransportError::InvalidToken)?;
            value.set_sensitive(true);
            request = request.header(VAULT_TOKEN_HEADER, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Vault returned error status");
            return Err(TransportError::status(status.as_u16(), text));
        }

        Ok(response)
    }
}
