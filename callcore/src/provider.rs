//! # Voice Provider Client (spec.md §4.5)
//!
//! A thin `reqwest`-based wrapper, bounded to three operations. This is
//! the one outbound HTTP collaborator in the crate — grounded on the
//! teacher's `registrar::client` pattern of a `reqwest::Client` held
//! behind a small typed facade rather than passed around raw.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::domain::{AgentId, CallId};
use crate::error::{CallCoreError, Result};

#[derive(Clone)]
pub struct VoiceProviderClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCallRequest<'a> {
    pub agent_id: AgentId,
    pub to_phone: &'a str,
    pub from_phone: Option<&'a str>,
    pub user_data: serde_json::Value,
    pub webhook_url: &'a str,
    /// Idempotency key for `createCall` is the internal call id
    /// (spec.md §4.5) — passed explicitly rather than relying on the
    /// provider to generate one, so a retried request after a timeout
    /// cannot create a duplicate in-flight call.
    pub call_id: CallId,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCallResponse {
    pub execution_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCallStatus {
    InProgress,
    Completed,
    Failed,
    Unknown,
}

impl VoiceProviderClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallCoreError::provider(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// spec.md §4.5: on failure, this throws — callers (the processor)
    /// are expected to release the reserved slot and fail the queue item,
    /// not retry automatically (§4.4 "Dispatch errors").
    pub async fn create_call(&self, req: CreateCallRequest<'_>) -> Result<CreateCallResponse> {
        let url = format!("{}/calls", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Idempotency-Key", req.call_id.to_string())
            .json(&req)
            .send()
            .await
            .map_err(|e| CallCoreError::provider(format!("createCall request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, call_id = %req.call_id, "provider rejected createCall");
            return Err(CallCoreError::provider(format!(
                "createCall failed with status {status}: {body}"
            )));
        }

        response
            .json::<CreateCallResponse>()
            .await
            .map_err(|e| CallCoreError::provider(format!("malformed createCall response: {e}")))
    }

    pub async fn stop_call(&self, execution_id: &str) -> Result<()> {
        let url = format!("{}/calls/{}/stop", self.base_url, execution_id);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| CallCoreError::provider(format!("stopCall request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(%execution_id, "stopCall: provider has no record of this execution (already ended?)");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(CallCoreError::provider(format!(
                "stopCall failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Used only by out-of-band reconciliation sweeps (§B.1 supplement),
    /// never on the hot dispatch path.
    pub async fn get_call_status(&self, execution_id: &str) -> Result<ProviderCallStatus> {
        let url = format!("{}/calls/{}", self.base_url, execution_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CallCoreError::provider(format!("getCallStatus request failed: {e}")))?;

        if !response.status().is_success() {
            return Ok(ProviderCallStatus::Unknown);
        }

        #[derive(Deserialize)]
        struct StatusBody {
            status: String,
        }
        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| CallCoreError::provider(format!("malformed status response: {e}")))?;

        Ok(match body.status.as_str() {
            "in-progress" | "ringing" | "initiated" => ProviderCallStatus::InProgress,
            "completed" | "done" => ProviderCallStatus::Completed,
            "failed" | "error" => ProviderCallStatus::Failed,
            _ => ProviderCallStatus::Unknown,
        })
    }
}

/// spec.md §6.1: signature verification for inbound webhooks, grounded
/// here because it's the provider's half of the contract even though it
/// runs on the inbound path (`crate::webhook`).
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(expected.as_bytes(), signature_header.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Providers are expected to echo back the internal call id as a
/// deterministic idempotency key when the client chooses to pre-reserve
/// it (spec.md §4.5) — plain passthrough, kept as a function so call
/// sites read intent-first.
pub fn idempotency_key_for_call(call_id: CallId) -> String {
    call_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verification_matches_known_hmac() {
        let secret = "topsecret";
        let body = b"{\"event\":\"initiated\"}";
        let mut mac = <hmac::Hmac<sha2::Sha256> as hmac::Mac>::new_from_slice(secret.as_bytes())
            .unwrap();
        hmac::Mac::update(&mut mac, body);
        let sig = hex::encode(hmac::Mac::finalize(mac).into_bytes());
        assert!(verify_webhook_signature(secret, body, &sig));
    }

    #[test]
    fn signature_verification_rejects_tampered_body() {
        let secret = "topsecret";
        let body = b"{\"event\":\"initiated\"}";
        let mut mac = <hmac::Hmac<sha2::Sha256> as hmac::Mac>::new_from_slice(secret.as_bytes())
            .unwrap();
        hmac::Mac::update(&mut mac, body);
        let sig = hex::encode(hmac::Mac::finalize(mac).into_bytes());
        assert!(!verify_webhook_signature(secret, b"tampered", &sig));
    }
}
