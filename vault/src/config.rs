//! Vault client configuration.

use crate::auth::RoleCredential;
use crate::error::{VaultError, VaultResult};
use rust_common::{HttpConfig, RetryConfig, RetryPolicy, env};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault.service:8200`
    pub addr: String,
    /// Skip TLS certificate verification
    pub tls_skip_verify: bool,
    /// AppRole role id
    pub role_id: String,
    /// AppRole secret id
    pub secret_id: SecretString,
    /// Fraction of the remaining lease after which renewal is attempted, in (0, 1)
    pub renewal_fraction: f64,
    /// First backoff delay after a transient renewal failure
    pub initial_backoff: Duration,
    /// Backoff cap
    pub max_backoff: Duration,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// TTL increment requested on renewal; the lease's own duration when unset
    pub token_increment: Option<Duration>,
    /// Mount point of the KV v2 engine used by `read_secret`
    pub kv_mount: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: "http://127.0.0.1:8200".to_string(),
            tls_skip_verify: false,
            role_id: String::new(),
            secret_id: SecretString::from(String::new()),
            renewal_fraction: 0.66,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            token_increment: None,
            kv_mount: "secret".to_string(),
        }
    }
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(
        addr: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Self {
            addr: addr.into(),
            role_id: role_id.into(),
            secret_id: SecretString::from(secret_id.into()),
            ..Default::default()
        }
    }

    /// Load configuration from the process environment (and `.env`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] or [`VaultError::Platform`] when a
    /// variable is missing or malformed.
    pub fn from_env() -> VaultResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`VaultConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> VaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            addr: lookup("VAULT_ADDR").unwrap_or(defaults.addr),
            tls_skip_verify: env::parse_flag(&lookup, "VAULT_SKIP_VERIFY", false)?,
            role_id: env::require_var(&lookup, "VAULT_ROLE_ID")?,
            secret_id: SecretString::from(env::require_var(&lookup, "VAULT_SECRET_ID")?),
            renewal_fraction: env::parse_var(
                &lookup,
                "VAULT_RENEWAL_FRACTION",
                defaults.renewal_fraction,
            )?,
            initial_backoff: env::parse_millis(
                &lookup,
                "VAULT_INITIAL_BACKOFF_MS",
                defaults.initial_backoff,
            )?,
            max_backoff: env::parse_secs(&lookup, "VAULT_MAX_BACKOFF_SECS", defaults.max_backoff)?,
            request_timeout: env::parse_secs(
                &lookup,
                "VAULT_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            token_increment: lookup("VAULT_TOKEN_INCREMENT_SECS")
                .map(|_| env::parse_secs(&lookup, "VAULT_TOKEN_INCREMENT_SECS", Duration::ZERO))
                .transpose()?,
            kv_mount: lookup("VAULT_KV_MOUNT").unwrap_or(defaults.kv_mount),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every option for a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] naming the first bad option.
    pub fn validate(&self) -> VaultResult<()> {
        let url = Url::parse(&self.addr)
            .map_err(|e| VaultError::invalid_config(format!("addr {:?}: {e}", self.addr)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VaultError::invalid_config(format!(
                "addr must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.role_id.trim().is_empty() {
            return Err(VaultError::invalid_config("role_id is empty"));
        }
        if self.secret_id.expose_secret().trim().is_empty() {
            return Err(VaultError::invalid_config("secret_id is empty"));
        }
        if !(self.renewal_fraction > 0.0 && self.renewal_fraction < 1.0) {
            return Err(VaultError::invalid_config(format!(
                "renewal_fraction must be in (0, 1), got {}",
                self.renewal_fraction
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(VaultError::invalid_config("request_timeout must be non-zero"));
        }
        if self.initial_backoff.is_zero() || self.max_backoff < self.initial_backoff {
            return Err(VaultError::invalid_config(
                "backoff must satisfy 0 < initial_backoff <= max_backoff",
            ));
        }
        if self.token_increment.is_some_and(|d| d.is_zero()) {
            return Err(VaultError::invalid_config("token_increment must be non-zero"));
        }
        if self.kv_mount.trim_matches('/').is_empty() {
            return Err(VaultError::invalid_config("kv_mount is empty"));
        }
        Ok(())
    }

    /// Skip TLS certificate verification.
    #[must_use]
    pub const fn with_tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    /// Set the renewal fraction.
    #[must_use]
    pub const fn with_renewal_fraction(mut self, fraction: f64) -> Self {
        self.renewal_fraction = fraction;
        self
    }

    /// Set the renewal backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Request a fixed TTL increment on renewal.
    #[must_use]
    pub const fn with_token_increment(mut self, increment: Duration) -> Self {
        self.token_increment = Some(increment);
        self
    }

    /// Set the KV v2 mount.
    #[must_use]
    pub fn with_kv_mount(mut self, mount: impl Into<String>) -> Self {
        self.kv_mount = mount.into();
        self
    }

    /// The AppRole credential pair.
    #[must_use]
    pub fn role_credential(&self) -> RoleCredential {
        RoleCredential::new(self.role_id.clone(), self.secret_id.clone())
    }

    /// HTTP settings for the transport.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.request_timeout)
            .with_insecure_tls(self.tls_skip_verify)
    }

    /// Backoff policy for transient renewal failures.
    #[must_use]
    pub fn backoff_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_max_retries(u32::MAX)
                .with_initial_delay(self.initial_backoff)
                .with_max_delay(self.max_backoff),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!((config.renewal_fraction - 0.66).abs() < f64::EPSILON);
        assert!(!config.tls_skip_verify);
        assert!(config.token_increment.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let config = VaultConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "https://vault.internal:8200"),
            ("VAULT_SKIP_VERIFY", "true"),
            ("VAULT_ROLE_ID", "r1"),
            ("VAULT_SECRET_ID", "s1"),
            ("VAULT_RENEWAL_FRACTION", "0.5"),
            ("VAULT_MAX_BACKOFF_SECS", "10"),
            ("VAULT_REQUEST_TIMEOUT_SECS", "5"),
            ("VAULT_TOKEN_INCREMENT_SECS", "3600"),
        ]))
        .unwrap();

        assert_eq!(config.addr, "https://vault.internal:8200");
        assert!(config.tls_skip_verify);
        assert_eq!(config.role_id, "r1");
        assert_eq!(config.secret_id.expose_secret(), "s1");
        assert!((config.renewal_fraction - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.max_backoff, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.token_increment, Some(Duration::from_secs(3600)));
        assert_eq!(config.kv_mount, "secret");
        assert!(config.http_config().accept_invalid_certs);
        assert_eq!(config.http_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_tls_skip_verify_reaches_http_config() {
        let base = VaultConfig::new("https://vault.internal:8200", "r1", "s1");
        assert!(!base.http_config().accept_invalid_certs);
        assert!(base.with_tls_skip_verify(true).http_config().accept_invalid_certs);

        let unset = VaultConfig::from_lookup(lookup_from(&[
            ("VAULT_ROLE_ID", "r1"),
            ("VAULT_SECRET_ID", "s1"),
        ]))
        .unwrap();
        assert!(!unset.http_config().accept_invalid_certs);
    }

    #[test]
    fn test_from_lookup_requires_credentials() {
        let err = VaultConfig::from_lookup(lookup_from(&[("VAULT_ROLE_ID", "r1")])).unwrap_err();
        assert!(err.to_string().contains("VAULT_SECRET_ID"));
    }

    #[test]
    fn test_fraction_bounds() {
        let base = VaultConfig::new("http://127.0.0.1:8200", "r1", "s1");
        assert!(base.clone().with_renewal_fraction(0.0).validate().is_err());
        assert!(base.clone().with_renewal_fraction(1.0).validate().is_err());
        assert!(base.clone().with_renewal_fraction(f64::NAN).validate().is_err());
        assert!(base.with_renewal_fraction(0.99).validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = VaultConfig::new("http://127.0.0.1:8200", "r1", "s1")
            .with_request_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(VaultError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_addr_rejected() {
        assert!(VaultConfig::new("vault:8200", "r1", "s1").validate().is_err());
        assert!(VaultConfig::new("ftp://vault:21", "r1", "s1").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret_id() {
        let config = VaultConfig::new("http://127.0.0.1:8200", "r1", "very-secret-id");
        assert!(!format!("{config:?}").contains("very-secret-id"));
    }
}
