//! Tracing subscriber setup.

use crate::PlatformError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name, recorded on the startup event
    pub service_name: String,
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to output JSON lines
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "rust-service".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the default log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Switch to JSON output when `format` is `"json"`.
    #[must_use]
    pub fn with_format(self, format: Option<&str>) -> Self {
        match format {
            Some(f) if f.eq_ignore_ascii_case("json") => self.with_json_output(),
            _ => self,
        }
    }
}

/// Install the global tracing subscriber. Call once at startup.
///
/// # Errors
///
/// Returns [`PlatformError::Tracing`] if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), PlatformError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_output {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| PlatformError::Tracing(e.to_string()))?;

    tracing::info!(service = %config.service_name, "Tracing initialized");
    Ok(())
}
