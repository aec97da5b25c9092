mod notifications;
mod queue;
mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/voice", post(webhooks::voice_webhook))
        .route("/queue/process", post(queue::process))
        .route("/queue/process/immediate", post(queue::process_immediate))
        .route("/queue/schedule", get(queue::schedule))
        .route("/queue/schedule/refresh", post(queue::schedule_refresh))
        .route("/calls/queue/status", get(queue::queue_status))
        .route("/calls/initiate", post(queue::initiate_call))
        .route(
            "/notifications/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .route("/notifications/history", get(notifications::history))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
