//! Vault client: AppRole login, background renewal and authenticated requests.

use crate::auth::{Authenticator, RoleCredential};
use crate::config::VaultConfig;
use crate::error::{AuthError, RenewalError, TransportError, VaultError, VaultResult};
use crate::lease::Lease;
use crate::provider::{SecretMetadata, SecretProvider};
use crate::renewer::{FailureCallback, LeaseRenewer, RenewerExit, RenewerHandle, RenewerState};
use crate::secrets::KvResponse;
use crate::store::CredentialStore;
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::{Method, Response};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Vault client holding one AppRole token and keeping it renewed.
pub struct VaultClient {
    config: VaultConfig,
    credential: RoleCredential,
    store: Arc<CredentialStore>,
    transport: Arc<Transport>,
    authenticator: Arc<Authenticator>,
    renewer: Mutex<Option<RenewerHandle>>,
    state_tx: Arc<watch::Sender<RenewerState>>,
    on_failure: Option<FailureCallback>,
}

impl VaultClient {
    /// Create a new Vault client. Does not contact Vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] for a bad configuration and
    /// [`VaultError::Platform`] when the HTTP client cannot be built.
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;

        let transport = Arc::new(Transport::new(&config)?);
        let authenticator = Arc::new(Authenticator::new(
            Arc::clone(&transport),
            config.token_increment,
        ));

        Ok(Self {
            credential: config.role_credential(),
            config,
            store: Arc::new(CredentialStore::new()),
            transport,
            authenticator,
            renewer: Mutex::new(None),
            state_tx: Arc::new(watch::channel(RenewerState::Idle).0),
            on_failure: None,
        })
    }

    /// Invoke `callback` once per renewer when it dies. Runs on the renewer
    /// task, so it must not block.
    #[must_use]
    pub fn with_failure_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RenewalError) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    /// Log in with the configured AppRole credential and start renewing.
    ///
    /// A renewer left over from an earlier login is stopped once the new
    /// token is in hand. On failure nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Auth`]; never retries. A lease that is already
    /// expired when it arrives is refused as `InvalidLease`.
    #[instrument(skip(self), fields(addr = %self.config.addr))]
    pub async fn login(&self) -> VaultResult<Arc<Lease>> {
        let mut renewer = self.renewer.lock().await;

        let lease = self.authenticator.login(&self.credential).await?;

        if let Some(previous) = renewer.take() {
            let exit = previous.stop().await;
            debug!(?exit, "Previous lease renewer stopped");
        }

        let lease = self.store.set(lease).map_err(|_| {
            AuthError::InvalidLease("lease expired before it could be stored".to_string())
        })?;
        *renewer = Some(
            LeaseRenewer::new(
                Arc::clone(&self.authenticator),
                Arc::clone(&self.store),
                self.config.renewal_fraction,
                self.config.backoff_policy(),
            )
            .with_failure_callback(self.on_failure.clone())
            .with_state_channel(Arc::clone(&self.state_tx))
            .spawn(Arc::clone(&lease)),
        );

        Ok(lease)
    }

    /// Token of the live lease, if any.
    #[must_use]
    pub fn current_token(&self) -> Option<SecretString> {
        self.store.current_token()
    }

    /// The credential store shared with the renewer.
    #[must_use]
    pub const fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Watch the renewer's state. Survives re-login.
    #[must_use]
    pub fn renewer_state(&self) -> watch::Receiver<RenewerState> {
        self.state_tx.subscribe()
    }

    /// Send a request carrying the live token.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotAuthenticated`] when there is no live,
    /// unexpired lease, and [`VaultError::Transport`] when the request fails.
    pub async fn send_authenticated(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<Response> {
        let lease = self
            .store
            .get()
            .filter(|lease| !lease.is_expired(Instant::now()))
            .ok_or(VaultError::NotAuthenticated)?;

        Ok(self
            .transport
            .send(method, path, body, Some(lease.token()))
            .await?)
    }

    /// Stop the renewer and wait for it. `None` when none was running.
    ///
    /// The store keeps its lease; it simply stops being renewed.
    pub async fn stop(&self) -> Option<RenewerExit> {
        let handle = self.renewer.lock().await.take()?;
        let exit = handle.stop().await;
        info!(?exit, "Vault client stopped");
        Some(exit)
    }

    async fn read_kv<T>(&self, path: &str, version: Option<u32>) -> VaultResult<(T, SecretMetadata)>
    where
        T: DeserializeOwned,
    {
        let path = path.trim_matches('/');
        let mount = self.config.kv_mount.trim_matches('/');
        let api_path = match version {
            Some(v) => format!("/v1/{mount}/data/{path}?version={v}"),
            None => format!("/v1/{mount}/data/{path}"),
        };

        let response = match self.send_authenticated(Method::GET, &api_path, None).await {
            Err(VaultError::Transport(TransportError::Status { status: 404, .. })) => {
                return Err(VaultError::SecretNotFound(path.to_string()));
            }
            other => other?,
        };
        let bytes = response.bytes().await.map_err(TransportError::from)?;
        let response: KvResponse<T> = serde_json::from_slice(&bytes)?;

        let metadata = SecretMetadata {
            lease_id: Some(response.lease_id).filter(|id| !id.is_empty()),
            ttl: Duration::from_secs(response.lease_duration),
            renewable: response.renewable,
            version: Some(response.data.metadata.version),
        };

        Ok((response.data.data, metadata))
    }
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultClient")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("renewer_state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretProvider for VaultClient {
    type Error = VaultError;

    #[instrument(skip(self))]
    async fn get_secret<T>(&self, path: &str) -> VaultResult<(T, SecretMetadata)>
    where
        T: DeserializeOwned + Send,
    {
        debug!(path, "Getting secret");
        self.read_kv(path, None).await
    }

    #[instrument(skip(self))]
    async fn get_secret_version<T>(
        &self,
        path: &str,
        version: u32,
    ) -> VaultResult<(T, SecretMetadata)>
    where
        T: DeserializeOwned + Send,
    {
        debug!(path, version, "Getting secret version");
        self.read_kv(path, Some(version)).await
    }
}
