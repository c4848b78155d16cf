//! Generic secret provider trait.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Metadata about a retrieved secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMetadata {
    /// Lease ID for leased secrets; `None` for static KV entries
    pub lease_id: Option<String>,
    /// Time-to-live for the secret
    pub ttl: Duration,
    /// Whether the secret is renewable
    pub renewable: bool,
    /// Version number (for KV v2)
    pub version: Option<u32>,
}

/// Type-safe secret retrieval.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Error returned by the provider
    type Error: std::error::Error + Send + Sync;

    /// Get the latest version of a secret and deserialize it into `T`.
    async fn get_secret<T>(&self, path: &str) -> Result<(T, SecretMetadata), Self::Error>
    where
        T: DeserializeOwned + Send;

    /// Get a specific version of a secret (KV v2).
    async fn get_secret_version<T>(
        &self,
        path: &str,
        version: u32,
    ) -> Result<(T, SecretMetadata), Self::Error>
    where
        T: DeserializeOwned + Send;
}
