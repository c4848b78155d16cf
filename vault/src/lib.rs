//! HashiCorp Vault AppRole client for Auth Platform.
//!
//! Logs in with an AppRole role id / secret id pair, keeps the resulting
//! token alive with a background [`renewer`], and publishes the current
//! lease through a lock-free [`CredentialStore`].
//!
//! ```no_run
//! use auth_vault_approle::{VaultClient, VaultConfig};
//!
//! # async fn run() -> auth_vault_approle::VaultResult<()> {
//! let client = VaultClient::new(VaultConfig::from_env()?)?
//!     .with_failure_callback(|err| eprintln!("Vault token lost: {err}"));
//! client.login().await?;
//! let token = client.current_token();
//! # let _ = token;
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod lease;
pub mod provider;
pub mod renewer;
pub mod secrets;
pub mod store;
pub mod transport;

pub use auth::{Authenticator, RenewLease, RoleCredential};
pub use client::VaultClient;
pub use config::VaultConfig;
pub use error::{AuthError, RenewalError, TransportError, VaultError, VaultResult};
pub use lease::Lease;
pub use provider::{SecretMetadata, SecretProvider};
pub use renewer::{
    FailureCallback, LeaseRenewer, RenewalOutcome, RenewerExit, RenewerHandle, RenewerState,
    next_wake,
};
pub use store::{CredentialState, CredentialStore};
pub use transport::Transport;
