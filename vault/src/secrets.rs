//! Vault wire types.
//!
//! Only the fields this client reads are modelled; everything else Vault
//! sends is ignored. Missing or `null` fields fall back to defaults so that
//! shape problems surface as domain errors (empty credential, invalid lease)
//! rather than as opaque decode failures.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/auth/approle/login`.
#[derive(Serialize)]
pub struct AppRoleLogin<'a> {
    /// AppRole role id
    pub role_id: &'a str,
    /// AppRole secret id
    pub secret_id: &'a str,
}

/// Body of `POST /v1/auth/token/renew-self`.
#[derive(Debug, Serialize)]
pub struct RenewSelf {
    /// Requested TTL extension in seconds
    pub increment: u64,
}

/// Vault auth response (login and token renewal).
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// Auth section; `null` on non-auth responses
    #[serde(default)]
    pub auth: Option<AuthData>,
    /// Warnings attached by Vault
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// The `auth` section of a Vault response.
#[derive(Debug, Deserialize)]
pub struct AuthData {
    /// The issued token
    #[serde(default)]
    pub client_token: Option<SecretString>,
    /// Token accessor, the non-secret handle on the token's lease
    #[serde(default)]
    pub accessor: String,
    /// Policies attached to the token; Vault sends `null` when there are none
    #[serde(default)]
    pub policies: Option<Vec<String>>,
    /// TTL in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token may be renewed
    #[serde(default)]
    pub renewable: bool,
}

/// Vault KV v2 response wrapper.
#[derive(Debug, Deserialize)]
pub struct KvResponse<T> {
    /// Payload and version metadata
    pub data: KvData<T>,
    /// Lease id, usually empty for KV
    #[serde(default)]
    pub lease_id: String,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Renewable flag
    #[serde(default)]
    pub renewable: bool,
}

/// `data` section of a KV v2 read.
#[derive(Debug, Deserialize)]
pub struct KvData<T> {
    /// The secret itself
    pub data: T,
    /// Version metadata
    pub metadata: KvMetadata,
}

/// KV v2 version metadata.
#[derive(Debug, Deserialize)]
pub struct KvMetadata {
    /// RFC 3339 creation time
    #[serde(default)]
    pub created_time: String,
    /// RFC 3339 deletion time, empty when live
    #[serde(default)]
    pub deletion_time: String,
    /// Whether this version was destroyed
    #[serde(default)]
    pub destroyed: bool,
    /// Version number
    pub version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_auth_response_with_null_fields() {
        let json = r#"{"auth":{"client_token":"tok-123","accessor":"acc-1","policies":null,"lease_duration":3600,"renewable":true},"warnings":null}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        let auth = resp.auth.unwrap();
        assert_eq!(auth.client_token.unwrap().expose_secret(), "tok-123");
        assert_eq!(auth.accessor, "acc-1");
        assert_eq!(auth.lease_duration, 3600);
        assert!(auth.renewable);
        assert!(auth.policies.is_none());
        assert!(resp.warnings.is_none());
    }

    #[test]
    fn test_auth_response_null_auth() {
        let resp: AuthResponse = serde_json::from_str(r#"{"auth":null,"data":{}}"#).unwrap();
        assert!(resp.auth.is_none());
    }

    #[test]
    fn test_auth_data_debug_redacts_token() {
        let resp: AuthResponse =
            serde_json::from_str(r#"{"auth":{"client_token":"hvs.super-secret"}}"#).unwrap();
        assert!(!format!("{resp:?}").contains("hvs.super-secret"));
    }

    #[test]
    fn test_kv_response() {
        let json = r#"{"data":{"data":{"password":"pw"},"metadata":{"version":3}},"lease_id":"","lease_duration":0,"renewable":false}"#;
        let resp: KvResponse<std::collections::HashMap<String, String>> =
            serde_json::from_str(json).unwrap();
        assert_eq!(resp.data.data["password"], "pw");
        assert_eq!(resp.data.metadata.version, 3);
    }
}
