//! Mock Vault server.
//!
//! Thin wrapper over [`wiremock::MockServer`] with mounts for the endpoints
//! the AppRole client talks to.

use crate::fixtures;
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// AppRole login path.
pub const LOGIN_PATH: &str = "/v1/auth/approle/login";

/// Token self-renewal path.
pub const RENEW_SELF_PATH: &str = "/v1/auth/token/renew-self";

/// A running mock Vault.
pub struct MockVault {
    server: MockServer,
}

impl MockVault {
    /// Start a mock server on a random local port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base address to configure the client with.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// The underlying server, for custom mounts.
    #[must_use]
    pub const fn server(&self) -> &MockServer {
        &self.server
    }

    /// Accept `role_id`/`secret_id` and issue `token`.
    pub async fn mount_login_ok(
        &self,
        role_id: &str,
        secret_id: &str,
        token: &str,
        lease_duration: u64,
        renewable: bool,
    ) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(serde_json::json!({
                "role_id": role_id,
                "secret_id": secret_id,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(fixtures::login_response(
                    token,
                    lease_duration,
                    renewable,
                )),
            )
            .mount(&self.server)
            .await;
    }

    /// Issue `token` for any login, but only after `delay`.
    pub async fn mount_login_delayed(&self, token: &str, lease_duration: u64, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::login_response(token, lease_duration, true))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every login with `status` and a Vault error body.
    pub async fn mount_login_status(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(fixtures::vault_error(message)),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every login with a raw body.
    pub async fn mount_login_raw(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Renew `current_token` into `next_token` with a fresh `lease_duration`.
    pub async fn mount_renew_self(
        &self,
        current_token: &str,
        next_token: &str,
        lease_duration: u64,
    ) {
        Mock::given(method("POST"))
            .and(path(RENEW_SELF_PATH))
            .and(header("X-Vault-Token", current_token))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(fixtures::login_response(
                    next_token,
                    lease_duration,
                    true,
                )),
            )
            .mount(&self.server)
            .await;
    }

    /// Renew any token into `next_token`, but only after `delay`.
    pub async fn mount_renew_self_delayed(
        &self,
        next_token: &str,
        lease_duration: u64,
        delay: Duration,
    ) {
        Mock::given(method("POST"))
            .and(path(RENEW_SELF_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::login_response(next_token, lease_duration, true))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every renewal with `status` and a Vault error body.
    pub async fn mount_renew_status(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(RENEW_SELF_PATH))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(fixtures::vault_error(message)),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve `data` at `{mount}/data/{secret_path}` for `token`.
    pub async fn mount_kv(
        &self,
        mount: &str,
        secret_path: &str,
        token: &str,
        data: &Value,
        version: u32,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{mount}/data/{secret_path}")))
            .and(header("X-Vault-Token", token))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(fixtures::kv_v2_response(data, version)),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer `http_path` with `status` after `delay`.
    pub async fn mount_delayed(
        &self,
        http_method: &str,
        http_path: &str,
        status: u16,
        delay: Duration,
    ) {
        Mock::given(method(http_method))
            .and(path(http_path))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Requests received so far for `http_path`.
    pub async fn requests_to(&self, http_path: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == http_path)
            .collect()
    }
}
