//! Shared test utilities for the Vault AppRole client.
//!
//! This crate provides:
//! - Proptest generators for credentials, tokens and lease parameters
//! - A wiremock-backed mock Vault server
//! - Vault response fixtures

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::MockVault;
