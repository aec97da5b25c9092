//! spec.md §6.2: the internal queue API — processor triggers, schedule
//! introspection, and user-initiated direct calls.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use callcore::domain::{QueueItemStatus, TenantId};
use callcore::processor::ProcessOutcome;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ProcessResponse {
    dispatched: u32,
    busy: bool,
    system_full: bool,
}

impl From<ProcessOutcome> for ProcessResponse {
    fn from(outcome: ProcessOutcome) -> Self {
        match outcome {
            ProcessOutcome::Processed { dispatched } => Self {
                dispatched,
                busy: false,
                system_full: false,
            },
            ProcessOutcome::Busy => Self {
                dispatched: 0,
                busy: true,
                system_full: false,
            },
            ProcessOutcome::SystemFull => Self {
                dispatched: 0,
                busy: false,
                system_full: true,
            },
        }
    }
}

/// `POST /queue/process` — idempotent, honored by a scheduler cron.
pub async fn process(State(state): State<AppState>) -> ApiResult<Json<ProcessResponse>> {
    let outcome = state.core.processor.process_smart().await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
pub struct ProcessImmediateQuery {
    #[serde(default)]
    tenant: Option<TenantId>,
}

/// `POST /queue/process/immediate` — bypasses the schedule-cache gate.
pub async fn process_immediate(
    State(state): State<AppState>,
    Query(q): Query<ProcessImmediateQuery>,
) -> ApiResult<Json<ProcessResponse>> {
    let outcome = state.core.processor.process_immediate(q.tenant).await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    next_wake_time: Option<chrono::DateTime<Utc>>,
    current_time: chrono::DateTime<Utc>,
    campaign_count: usize,
    minutes_until_wake: Option<i64>,
}

/// `GET /queue/schedule`.
pub async fn schedule(State(state): State<AppState>) -> Json<ScheduleResponse> {
    let now = Utc::now();
    let next_wake_time = state.core.schedule_cache.next_wake(now).await;
    let minutes_until_wake = next_wake_time.map(|wake| (wake - now).num_minutes().max(0));
    Json(ScheduleResponse {
        next_wake_time,
        current_time: now,
        campaign_count: state.core.schedule_cache.campaign_count(),
        minutes_until_wake,
    })
}

/// `POST /queue/schedule/refresh` — forces a cache refresh.
pub async fn schedule_refresh(State(state): State<AppState>) -> ApiResult<Json<ScheduleResponse>> {
    let now = Utc::now();
    let next_wake_time = state.core.schedule_cache.force_refresh(now).await?;
    let minutes_until_wake = next_wake_time.map(|wake| (wake - now).num_minutes().max(0));
    Ok(Json(ScheduleResponse {
        next_wake_time,
        current_time: now,
        campaign_count: state.core.schedule_cache.campaign_count(),
        minutes_until_wake,
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueueStatusQuery {
    tenant: TenantId,
}

#[derive(Debug, Serialize)]
struct QueueStatusResponse {
    direct_queued: i64,
    direct_processing: i64,
    campaign_queued: i64,
    campaign_processing: i64,
}

/// `GET /calls/queue/status` — per-tenant queue counts.
pub async fn queue_status(
    State(state): State<AppState>,
    Query(q): Query<QueueStatusQuery>,
) -> ApiResult<Json<QueueStatusResponse>> {
    let stats = state.core.queue.stats_for(q.tenant).await?;
    Ok(Json(QueueStatusResponse {
        direct_queued: stats.direct_queued,
        direct_processing: stats.direct_processing,
        campaign_queued: stats.campaign_queued,
        campaign_processing: stats.campaign_processing,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InitiateCallRequest {
    pub tenant_id: TenantId,
    pub agent_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub phone: String,
}

#[derive(Debug, Serialize)]
struct InitiatedResponse {
    call_id: Uuid,
}

#[derive(Debug, Serialize)]
struct QueuedResponse {
    queue: QueuedPayload,
}

#[derive(Debug, Serialize)]
struct QueuedPayload {
    id: Uuid,
    position: i64,
    total_in_queue: i64,
    estimated_wait_minutes: i64,
}

/// `POST /calls/initiate` — spec.md §6.2: 200 with `callId` if a slot was
/// reserved and dispatch started, else **202 Accepted** with the queue
/// position; never 429. A direct item is always enqueued first so the
/// caller has a durable record of the request regardless of outcome,
/// then an immediate processor pass is run scoped to this tenant so a
/// free slot is claimed without waiting for the next scheduled tick.
pub async fn initiate_call(
    State(state): State<AppState>,
    Json(req): Json<InitiateCallRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = state
        .core
        .queue
        .enqueue_direct(req.tenant_id, req.agent_id, req.contact_id, &req.phone)
        .await?;
    state.core.schedule_cache.invalidate();

    state.core.processor.process_immediate(Some(req.tenant_id)).await?;

    let refreshed = state.core.queue.stats_for(req.tenant_id).await?;

    // Re-check our own item's current status rather than trusting the
    // pass's aggregate dispatch count, since other tenants' items
    // dispatching in the same pass tell us nothing about this one.
    if let Some(current) = state.core.queue.item_by_id(item.id).await? {
        if current.status == QueueItemStatus::Processing {
            if let Some(call_id) = current.call_id {
                return Ok((StatusCode::OK, Json(InitiatedResponse { call_id })).into_response());
            }
        }
    }

    let position = state.core.queue.position_of(item.id).await?.unwrap_or(1);
    let total_in_queue = refreshed.direct_queued + refreshed.campaign_queued;
    let estimated_wait_minutes = position * 2;

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            queue: QueuedPayload {
                id: item.id,
                position,
                total_in_queue,
                estimated_wait_minutes,
            },
        }),
    )
        .into_response())
}
