//! AppRole authentication and token renewal.

use crate::error::{AuthError, RenewalError};
use crate::lease::Lease;
use crate::secrets::{AppRoleLogin, AuthResponse, RenewSelf};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// AppRole login endpoint.
pub const APPROLE_LOGIN_PATH: &str = "/v1/auth/approle/login";

/// Token self-renewal endpoint.
pub const RENEW_SELF_PATH: &str = "/v1/auth/token/renew-self";

/// AppRole credential pair. The secret id never appears in `Debug` output.
#[derive(Clone)]
pub struct RoleCredential {
    role_id: String,
    secret_id: SecretString,
}

impl RoleCredential {
    /// Create a credential pair.
    #[must_use]
    pub fn new(role_id: impl Into<String>, secret_id: SecretString) -> Self {
        Self {
            role_id: role_id.into(),
            secret_id,
        }
    }

    /// The role id.
    #[must_use]
    pub fn role_id(&self) -> &str {
        &self.role_id
    }
}

impl fmt::Debug for RoleCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCredential")
            .field("role_id", &"[REDACTED]")
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

/// Something that can extend a lease.
///
/// Implemented by [`Authenticator`] against Vault; the lease renewer only
/// depends on this trait.
#[async_trait]
pub trait RenewLease: Send + Sync {
    /// Renew `lease`, returning the lease that supersedes it.
    async fn renew(&self, lease: &Lease) -> Result<Lease, RenewalError>;
}

/// Exchanges AppRole credentials for a leased token.
#[derive(Debug)]
pub struct Authenticator {
    transport: Arc<Transport>,
    token_increment: Option<Duration>,
}

impl Authenticator {
    /// Create an authenticator. `token_increment` is the TTL requested on
    /// renewal; `None` asks for the lease's own duration again.
    #[must_use]
    pub const fn new(transport: Arc<Transport>, token_increment: Option<Duration>) -> Self {
        Self {
            transport,
            token_increment,
        }
    }

    /// Log in once. Never retries.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`]: `Rejected` for a non-2xx status, `Decode` for a
    /// malformed body, `EmptyCredential` when the auth section or token is
    /// missing, `InvalidLease` for a zero TTL, `Transport` when Vault is
    /// unreachable.
    #[instrument(skip_all)]
    pub async fn login(&self, credential: &RoleCredential) -> Result<Lease, AuthError> {
        let body = serde_json::to_value(AppRoleLogin {
            role_id: &credential.role_id,
            secret_id: credential.secret_id.expose_secret(),
        })
        .map_err(AuthError::Decode)?;

        let started = Instant::now();
        let response = self
            .transport
            .send(Method::POST, APPROLE_LOGIN_PATH, Some(&body), None)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(e.into()))?;

        let lease = lease_from_auth_response(&bytes, started)?;
        if lease.is_expired(Instant::now()) {
            return Err(AuthError::InvalidLease(format!(
                "lease of {}s expired before the response arrived",
                lease.duration().as_secs()
            )));
        }
        info!(
            accessor = %lease.lease_id(),
            ttl_secs = lease.duration().as_secs(),
            renewable = lease.renewable(),
            expires_at = %lease.expires_at_utc(),
            "Authenticated with Vault using AppRole"
        );
        Ok(lease)
    }
}

#[async_trait]
impl RenewLease for Authenticator {
    #[instrument(skip_all, fields(accessor = %lease.lease_id()))]
    async fn renew(&self, lease: &Lease) -> Result<Lease, RenewalError> {
        if !lease.renewable() {
            return Err(RenewalError::NotRenewable);
        }

        let increment = self.token_increment.unwrap_or_else(|| lease.duration());
        let body = serde_json::to_value(RenewSelf {
            increment: increment.as_secs(),
        })
        .map_err(|e| RenewalError::Transient(e.to_string()))?;

        let started = Instant::now();
        let response = self
            .transport
            .send(Method::POST, RENEW_SELF_PATH, Some(&body), Some(lease.token()))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenewalError::Transient(e.to_string()))?;

        let renewed = lease_from_auth_response(&bytes, started)
            .map_err(|e| RenewalError::Transient(e.to_string()))?;
        let now = Instant::now();
        if renewed.is_expired(now) {
            if lease.is_expired(now) {
                return Err(RenewalError::Expired);
            }
            return Err(RenewalError::Transient(format!(
                "renewed lease of {}s expired before the response arrived",
                renewed.duration().as_secs()
            )));
        }
        if renewed.duration() < increment {
            warn!(
                requested_secs = increment.as_secs(),
                granted_secs = renewed.duration().as_secs(),
                "Vault granted a shorter TTL than requested; token is nearing its max TTL"
            );
        }
        Ok(renewed)
    }
}

/// Turn a login or renewal response body into a lease that started at `issued_at`.
pub(crate) fn lease_from_auth_response(
    bytes: &[u8],
    issued_at: Instant,
) -> Result<Lease, AuthError> {
    let response: AuthResponse = serde_json::from_slice(bytes).map_err(AuthError::Decode)?;
    for warning in response.warnings.iter().flatten() {
        warn!(warning = %warning, "Vault response warning");
    }

    let auth = response.auth.ok_or(AuthError::EmptyCredential)?;
    let token = auth
        .client_token
        .filter(|t| !t.expose_secret().is_empty())
        .ok_or(AuthError::EmptyCredential)?;
    if auth.lease_duration == 0 {
        return Err(AuthError::InvalidLease("lease_duration is zero".to_string()));
    }

    Ok(Lease::new(
        token,
        auth.accessor,
        Duration::from_secs(auth.lease_duration),
        auth.renewable,
        issued_at,
    )
    .with_policies(auth.policies.unwrap_or_default()))
}
