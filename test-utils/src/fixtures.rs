//! Vault response bodies.
//!
//! Shapes follow what Vault actually sends, `null` fields included.

use serde_json::{Value, json};

/// Successful AppRole login or token renewal.
#[must_use]
pub fn login_response(token: &str, lease_duration: u64, renewable: bool) -> Value {
    json!({
        "request_id": "8c5e6b2d-3c6a-4b0e-9a57-4f0c1f1c2b7e",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "wrap_info": null,
        "warnings": null,
        "auth": {
            "client_token": token,
            "accessor": format!("acc-{token}"),
            "policies": ["default", "app"],
            "token_policies": ["default", "app"],
            "metadata": { "role_name": "app" },
            "lease_duration": lease_duration,
            "renewable": renewable,
            "entity_id": "",
            "token_type": "service",
            "orphan": true
        }
    })
}

/// Successful KV v2 read.
#[must_use]
pub fn kv_v2_response(data: &Value, version: u32) -> Value {
    json!({
        "request_id": "0f3d9e1a-7f57-4c0b-8d8b-2b1f6a5c9e10",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": {
            "data": data,
            "metadata": {
                "created_time": "2026-01-01T00:00:00.000000Z",
                "custom_metadata": null,
                "deletion_time": "",
                "destroyed": false,
                "version": version
            }
        },
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

/// Vault error body.
#[must_use]
pub fn vault_error(message: &str) -> Value {
    json!({ "errors": [message] })
}
