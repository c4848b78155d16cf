//! `approle-agent`: logs in to Vault with AppRole and keeps the token alive
//! until Ctrl-C or a terminal renewal failure.

use anyhow::{Context, bail};
use auth_vault_approle::{RenewalError, SecretProvider, VaultClient, VaultConfig};
use rust_common::{RetryConfig, RetryPolicy, TracingConfig, init_tracing};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "approle-agent";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_format = std::env::var("LOG_FORMAT").ok();
    init_tracing(
        &TracingConfig::default()
            .with_service_name(SERVICE_NAME)
            .with_format(log_format.as_deref()),
    )?;

    let config = VaultConfig::from_env().context("loading Vault configuration")?;
    info!(addr = %config.addr, role_id = %config.role_id, "Starting AppRole agent");

    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<RenewalError>();
    let client = VaultClient::new(config)
        .context("building Vault client")?
        .with_failure_callback(move |err| {
            let _ = failure_tx.send(err.clone());
        });

    let startup = RetryPolicy::new(
        RetryConfig::default()
            .with_max_retries(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10)),
    );
    let lease = startup
        .execute(|| client.login())
        .await
        .context("logging in to Vault")?;
    info!(
        accessor = %lease.lease_id(),
        expires_at = %lease.expires_at_utc(),
        "Vault token acquired"
    );

    if let Ok(path) = std::env::var("VAULT_AGENT_SECRET_PATH") {
        match client
            .get_secret::<BTreeMap<String, serde_json::Value>>(&path)
            .await
        {
            Ok((secret, metadata)) => info!(
                path = %path,
                version = ?metadata.version,
                keys = ?secret.keys().collect::<Vec<_>>(),
                "Read secret"
            ),
            Err(e) => warn!(path = %path, error = %e, "Could not read secret"),
        }
    }

    let failure = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("Shutdown signal received");
            None
        }
        err = failure_rx.recv() => err,
    };

    client.stop().await;

    if let Some(err) = failure {
        error!(error = %err, "Vault token can no longer be renewed");
        bail!("lease renewal failed: {err}");
    }

    info!("AppRole agent stopped");
    Ok(())
}
