//! Credential store: the single slot holding the current lease.
//!
//! Reads are lock-free snapshots through [`ArcSwap`]; a reader sees either the
//! previous or the next state, never a mix. Writes are crate-private: the
//! initial write comes from [`VaultClient::login`](crate::VaultClient::login),
//! later ones from the lease renewer.

use crate::error::RenewalError;
use crate::lease::Lease;
use arc_swap::ArcSwap;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::time::Instant;

/// What the store currently holds.
#[derive(Debug, Clone, Default)]
pub enum CredentialState {
    /// Nothing yet (before login)
    #[default]
    Empty,
    /// A lease that was valid when written and is being kept alive
    Live(Arc<Lease>),
    /// The renewer gave up on this lease; consumers must re-login
    Stale(Arc<Lease>),
}

impl CredentialState {
    /// The live lease, if any.
    #[must_use]
    pub const fn live(&self) -> Option<&Arc<Lease>> {
        match self {
            Self::Live(lease) => Some(lease),
            Self::Empty | Self::Stale(_) => None,
        }
    }

    /// Whether the renewer has given up on the held lease.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Concurrency-safe holder of the current [`Lease`].
#[derive(Debug, Default)]
pub struct CredentialStore {
    slot: ArcSwap<CredentialState>,
}

impl CredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live lease, or `None` when empty or stale.
    #[must_use]
    pub fn get(&self) -> Option<Arc<Lease>> {
        self.slot.load().live().cloned()
    }

    /// Full state, including a stale lease.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CredentialState> {
        self.slot.load_full()
    }

    /// Token of the live lease.
    #[must_use]
    pub fn current_token(&self) -> Option<SecretString> {
        self.get().map(|lease| lease.token().clone())
    }

    /// Replace the slot with a fresh live lease.
    ///
    /// A lease that has already expired is refused with
    /// [`RenewalError::Expired`] and the slot is left untouched.
    pub(crate) fn set(&self, lease: Lease) -> Result<Arc<Lease>, RenewalError> {
        if lease.is_expired(Instant::now()) {
            return Err(RenewalError::Expired);
        }
        let lease = Arc::new(lease);
        self.slot
            .store(Arc::new(CredentialState::Live(Arc::clone(&lease))));
        Ok(lease)
    }

    /// Flag the held lease as stale. No-op when empty.
    pub(crate) fn mark_stale(&self) {
        self.slot.rcu(|current| match &**current {
            CredentialState::Live(lease) => CredentialState::Stale(Arc::clone(lease)),
            other => other.clone(),
        });
    }
}
