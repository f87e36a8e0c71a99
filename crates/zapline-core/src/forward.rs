//! External webhook forwarding
//!
//! Tenants can register their own webhook URL; inbound messages and status
//! updates are mirrored there as JSON, signed with the tenant's configured
//! secret in `X-Hub-Signature-256` — the same HMAC convention the provider
//! uses toward us.

use crate::errors::{CoreError, CoreResult};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;
use zapline_whatsapp::webhook::sign_body;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwards events to tenant-configured webhook endpoints.
#[derive(Clone)]
pub struct ExternalForwarder {
    http: reqwest::Client,
}

impl Default for ExternalForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalForwarder {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("zapline/0.1.0")
            .timeout(FORWARD_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// POST the payload to the tenant's URL. Failures are logged, never
    /// propagated: a broken tenant endpoint must not affect ingestion.
    pub async fn forward(&self, url: &str, secret: Option<&str>, payload: &Value) -> CoreResult<()> {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(secret) = secret {
            request = request.header("X-Hub-Signature-256", sign_body(secret, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::transient(e.to_string()))?;

        if !response.status().is_success() {
            warn!(
                url,
                status = response.status().as_u16(),
                "external webhook returned non-success"
            );
        }
        Ok(())
    }
}
