//! Shared library for cross-cutting concerns in auth-platform Vault clients.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building
//! - Retry policies with exponential backoff
//! - Environment-style configuration parsing
//! - Tracing subscriber initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use retry::{RetryConfig, RetryPolicy, Retryable};
pub use tracing_config::{TracingConfig, init_tracing};
