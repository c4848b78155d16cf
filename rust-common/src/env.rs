//! Typed lookups for environment-style configuration.
//!
//! Lookups take a closure instead of reading `std::env` directly so that
//! configuration can be loaded from a map in tests.

use crate::PlatformError;
use std::str::FromStr;
use std::time::Duration;

/// Parse `key` with `FromStr`, falling back to `default` when it is unset.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] when the value is present but
/// does not parse.
pub fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, PlatformError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| PlatformError::invalid_input(format!("Invalid {key}: {e}"))),
        None => Ok(default),
    }
}

/// Read a variable that must be present and non-empty.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] when the variable is missing or blank.
pub fn require_var<F>(lookup: &F, key: &str) -> Result<String, PlatformError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PlatformError::invalid_input(format!("{key} is required")))
}

/// Parse a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] for any other value.
pub fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool, PlatformError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(PlatformError::invalid_input(format!(
            "Invalid {key}: expected a boolean, got {other:?}"
        ))),
    }
}

/// Parse a whole number of seconds.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] when the value is not an integer.
pub fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, PlatformError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, key, default.as_secs()).map(Duration::from_secs)
}

/// Parse a whole number of milliseconds.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] when the value is not an integer.
pub fn parse_millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, PlatformError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_var(lookup, key, default_ms).map(Duration::from_millis)
}
