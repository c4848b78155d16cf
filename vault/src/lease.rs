//! Leased Vault token.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// A token together with the lease that bounds its validity.
///
/// Leases are immutable: a renewal produces a new `Lease` that supersedes the
/// old one in the [`CredentialStore`](crate::CredentialStore).
#[derive(Clone)]
pub struct Lease {
    token: SecretString,
    lease_id: String,
    duration: Duration,
    renewable: bool,
    policies: Vec<String>,
    issued_at: Instant,
    expires_at: Instant,
    expires_at_utc: DateTime<Utc>,
}

impl Lease {
    /// Build a lease that started at `issued_at` and lasts `duration`.
    #[must_use]
    pub fn new(
        token: SecretString,
        lease_id: impl Into<String>,
        duration: Duration,
        renewable: bool,
        issued_at: Instant,
    ) -> Self {
        let wall_clock_left = duration.saturating_sub(issued_at.elapsed());
        let expires_at_utc = chrono::Duration::from_std(wall_clock_left)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            token,
            lease_id: lease_id.into(),
            duration,
            renewable,
            policies: Vec::new(),
            issued_at,
            expires_at: issued_at + duration,
            expires_at_utc,
        }
    }

    /// Attach the token's policies.
    #[must_use]
    pub fn with_policies(mut self, policies: Vec<String>) -> Self {
        self.policies = policies;
        self
    }

    /// The bearer token. Never log it.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// Lease identifier (the token accessor for AppRole logins).
    #[must_use]
    pub fn lease_id(&self) -> &str {
        &self.lease_id
    }

    /// Lease duration as granted by Vault.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether Vault allows renewing this lease.
    #[must_use]
    pub const fn renewable(&self) -> bool {
        self.renewable
    }

    /// Policies attached to the token.
    #[must_use]
    pub fn policies(&self) -> &[String] {
        &self.policies
    }

    /// Instant the lease started.
    #[must_use]
    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Absolute expiry.
    #[must_use]
    pub const fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Approximate wall-clock expiry, for logs and diagnostics.
    #[must_use]
    pub const fn expires_at_utc(&self) -> DateTime<Utc> {
        self.expires_at_utc
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Whether the lease has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("token", &"[REDACTED]")
            .field("lease_id", &self.lease_id)
            .field("duration", &self.duration)
            .field("renewable", &self.renewable)
            .field("policies", &self.policies)
            .field("expires_at_utc", &self.expires_at_utc)
            .finish_non_exhaustive()
    }
}
