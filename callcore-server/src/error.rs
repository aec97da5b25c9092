//! Maps [`callcore::CallCoreError`] onto HTTP responses.
//!
//! Flow-control outcomes never reach here as errors — handlers turn
//! them into ordinary response bodies. This is only for the taxonomy in
//! spec §7: validation/not-found/already-exists get their matching
//! 4xx, everything else (storage, permanent dependency failures) is a
//! 500 with the detail logged, not echoed to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use callcore::CallCoreError;
use serde_json::json;
use tracing::error;

pub struct ApiError(pub CallCoreError);

impl From<CallCoreError> for ApiError {
    fn from(err: CallCoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CallCoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CallCoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            CallCoreError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg.clone()),
            CallCoreError::Webhook(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => {
                error!(error = %other, "unhandled error in request handler");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
