//! Shared proptest generators for Vault domain values.

use proptest::prelude::*;
use std::time::Duration;

/// AppRole role ids (UUID-shaped, as Vault generates them).
pub fn role_id_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

/// AppRole secret ids.
pub fn secret_id_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

/// Service tokens in the `hvs.` format.
pub fn token_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{24,90}".prop_map(|body| format!("hvs.{body}"))
}

/// Lease durations from one second to 32 days.
pub fn lease_duration_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=32 * 24 * 3600).prop_map(Duration::from_secs)
}

/// Renewal fractions strictly inside (0, 1).
pub fn renewal_fraction_strategy() -> impl Strategy<Value = f64> {
    (1u32..1000).prop_map(|n| f64::from(n) / 1000.0)
}

/// Elapsed time into a lease, in milliseconds, possibly past expiry.
pub fn elapsed_strategy() -> impl Strategy<Value = Duration> {
    (0u64..=40 * 24 * 3600 * 1000).prop_map(Duration::from_millis)
}
