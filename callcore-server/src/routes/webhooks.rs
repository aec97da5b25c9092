//! spec.md §6.1: the single inbound webhook endpoint. `event` absent or
//! `"completed"` means a completion payload; any lifecycle tag dispatches
//! to [`callcore::webhook::WebhookIngestion::handle_lifecycle`] instead.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use callcore::webhook::{CompletionPayload, LifecycleEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Deserialize)]
struct Discriminator {
    #[serde(default)]
    event: Option<String>,
}

pub async fn voice_webhook(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !state.core.webhook.verify_signature(&body, signature) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Ok(raw) = serde_json::from_slice::<Value>(&body) else {
        // spec §6.1: "Response: always 200 after persisting" is about
        // well-formed payloads; a body that isn't even JSON is the one
        // case this endpoint treats as a hard client error.
        return StatusCode::BAD_REQUEST.into_response();
    };

    let tag: Discriminator = match serde_json::from_value(raw.clone()) {
        Ok(d) => d,
        Err(_) => Discriminator { event: None },
    };

    let result = match tag.event.as_deref() {
        None | Some("completed") => match serde_json::from_value::<CompletionPayload>(raw) {
            Ok(payload) => state.core.webhook.handle_completion(payload).await.map(|_| ()),
            Err(e) => {
                warn!(error = %e, "malformed completion webhook payload");
                return StatusCode::BAD_REQUEST.into_response();
            }
        },
        Some(_) => match serde_json::from_value::<LifecycleEvent>(raw) {
            Ok(event) => state.core.webhook.handle_lifecycle(event).await,
            Err(e) => {
                warn!(error = %e, "malformed lifecycle webhook payload");
                return StatusCode::BAD_REQUEST.into_response();
            }
        },
    };

    if let Err(e) = result {
        warn!(error = %e, "webhook processing failed");
    }

    // spec §6.1: "always 200 after persisting (at-least-once is
    // acceptable; dedup is internal)" — a processing failure is logged,
    // never surfaced as a retry-inducing status to the provider.
    (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
}
