//! Persistence for `calls` and `transcripts` (spec.md §4.6, §6.4).

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{
    AgentId, Call, CallDirection, CallId, ContactId, HangupBy, LifecycleStatus, TenantId,
    Transcript, TranscriptSegment,
};
use crate::error::Result;

use super::DatabaseManager;

impl DatabaseManager {
    /// `insert if missing, update by executionId` (spec.md §6.4) — the
    /// upsert the webhook path relies on so a lifecycle event arriving
    /// before the synchronous `createCall` response is processed can
    /// still find or create its row.
    pub async fn upsert_call_placeholder(
        &self,
        execution_id: &str,
        tenant_id: TenantId,
        agent_id: AgentId,
        phone: &str,
    ) -> Result<Call> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO calls
                (id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                 lifecycle_status, initiated_at, credits_used, duration_seconds, duration_minutes)
             VALUES ($1, $2, $3, NULL, $4, 'inbound', $5, 'initiated', now(), 0, 0, 0)
             ON CONFLICT (execution_id) DO UPDATE SET execution_id = EXCLUDED.execution_id
             RETURNING id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                       lifecycle_status, initiated_at, ringing_started_at, call_answered_at,
                       call_disconnected_at, completed_at, duration_seconds, duration_minutes,
                       credits_used, hangup_by, hangup_reason, hangup_provider_code, provider_metadata",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(agent_id)
        .bind(execution_id)
        .bind(phone)
        .fetch_one(self.pool())
        .await?;

        row_to_call(&row)
    }

    pub async fn insert_call(
        &self,
        id: CallId,
        tenant_id: TenantId,
        agent_id: AgentId,
        contact_id: Option<ContactId>,
        execution_id: &str,
        direction: CallDirection,
        phone: &str,
    ) -> Result<Call> {
        let row = sqlx::query(
            "INSERT INTO calls
                (id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                 lifecycle_status, initiated_at, credits_used, duration_seconds, duration_minutes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'initiated', now(), 0, 0, 0)
             ON CONFLICT (execution_id) DO UPDATE SET execution_id = EXCLUDED.execution_id
             RETURNING id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                       lifecycle_status, initiated_at, ringing_started_at, call_answered_at,
                       call_disconnected_at, completed_at, duration_seconds, duration_minutes,
                       credits_used, hangup_by, hangup_reason, hangup_provider_code, provider_metadata",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(agent_id)
        .bind(contact_id)
        .bind(execution_id)
        .bind(direction_str(direction))
        .bind(phone)
        .fetch_one(self.pool())
        .await?;

        row_to_call(&row)
    }

    pub async fn call_by_execution_id(&self, execution_id: &str) -> Result<Option<Call>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                    lifecycle_status, initiated_at, ringing_started_at, call_answered_at,
                    call_disconnected_at, completed_at, duration_seconds, duration_minutes,
                    credits_used, hangup_by, hangup_reason, hangup_provider_code, provider_metadata
             FROM calls WHERE execution_id = $1",
        )
        .bind(execution_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_call).transpose()
    }

    pub async fn call_by_id(&self, call_id: CallId) -> Result<Option<Call>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                    lifecycle_status, initiated_at, ringing_started_at, call_answered_at,
                    call_disconnected_at, completed_at, duration_seconds, duration_minutes,
                    credits_used, hangup_by, hangup_reason, hangup_provider_code, provider_metadata
             FROM calls WHERE id = $1",
        )
        .bind(call_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_call).transpose()
    }

    /// spec.md §4.6 lifecycle updates: `ringing`, `in-progress`,
    /// `no-answer`/`busy`, `call-disconnected`. Never touches
    /// `ActiveSlot` — release only happens at completion.
    pub async fn apply_lifecycle_event(
        &self,
        execution_id: &str,
        status: LifecycleStatus,
        hangup_by: Option<HangupBy>,
        hangup_reason: Option<&str>,
        hangup_provider_code: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Call>> {
        let status_str = lifecycle_str(status);
        let hangup_by_str = hangup_by.map(hangup_by_str);

        let row = sqlx::query(
            "UPDATE calls SET
                lifecycle_status = $1,
                ringing_started_at = CASE WHEN $1 = 'ringing' THEN $2 ELSE ringing_started_at END,
                call_answered_at = CASE WHEN $1 = 'in-progress' THEN $2 ELSE call_answered_at END,
                call_disconnected_at = CASE WHEN $1 = 'call-disconnected' THEN $2 ELSE call_disconnected_at END,
                hangup_by = COALESCE($3, hangup_by),
                hangup_reason = COALESCE($4, hangup_reason),
                hangup_provider_code = COALESCE($5, hangup_provider_code)
             WHERE execution_id = $6 AND lifecycle_status NOT IN ('completed', 'failed', 'cancelled')
             RETURNING id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                       lifecycle_status, initiated_at, ringing_started_at, call_answered_at,
                       call_disconnected_at, completed_at, duration_seconds, duration_minutes,
                       credits_used, hangup_by, hangup_reason, hangup_provider_code, provider_metadata",
        )
        .bind(status_str)
        .bind(timestamp)
        .bind(hangup_by_str)
        .bind(hangup_reason)
        .bind(hangup_provider_code)
        .bind(execution_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_call).transpose()
    }

    /// spec.md §4.6 steps 2-3: completion update. `duration_minutes` and
    /// `credits_used` are computed by the caller (`ceil(seconds/60)`,
    /// §8 invariant 6) and passed in rather than computed in SQL, so the
    /// one ceil-division rule lives in exactly one place
    /// (`crate::webhook::billed_minutes`).
    pub async fn complete_call(
        &self,
        execution_id: &str,
        succeeded: bool,
        duration_seconds: i64,
        duration_minutes: i64,
        provider_metadata: Option<serde_json::Value>,
    ) -> Result<Option<Call>> {
        let status = if succeeded { "completed" } else { "failed" };
        let row = sqlx::query(
            "UPDATE calls SET
                lifecycle_status = $1,
                duration_seconds = $2,
                duration_minutes = $3,
                credits_used = $3,
                completed_at = now(),
                provider_metadata = COALESCE($4, provider_metadata)
             WHERE execution_id = $5 AND lifecycle_status NOT IN ('completed', 'failed', 'cancelled')
             RETURNING id, tenant_id, agent_id, contact_id, execution_id, direction, phone,
                       lifecycle_status, initiated_at, ringing_started_at, call_answered_at,
                       call_disconnected_at, completed_at, duration_seconds, duration_minutes,
                       credits_used, hangup_by, hangup_reason, hangup_provider_code, provider_metadata",
        )
        .bind(status)
        .bind(duration_seconds)
        .bind(duration_minutes)
        .bind(provider_metadata)
        .bind(execution_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_call).transpose()
    }

    pub async fn set_call_contact(&self, call_id: CallId, contact_id: ContactId) -> Result<()> {
        sqlx::query("UPDATE calls SET contact_id = $1 WHERE id = $2")
            .bind(contact_id)
            .bind(call_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Transcript is 1:1 with Call (spec.md §6.4: `transcripts(call_id
    /// unique, ...)`). A second insert for the same call is a no-op.
    pub async fn insert_transcript_if_absent(
        &self,
        call_id: CallId,
        tenant_id: TenantId,
        content: &str,
        segments: &[TranscriptSegment],
    ) -> Result<bool> {
        let segments_json = serde_json::to_value(segments)
            .map_err(|e| crate::error::CallCoreError::internal(format!("segment encode: {e}")))?;
        let result = sqlx::query(
            "INSERT INTO transcripts (call_id, tenant_id, content, segments)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (call_id) DO NOTHING",
        )
        .bind(call_id)
        .bind(tenant_id)
        .bind(content)
        .bind(segments_json)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn transcript_for_call(&self, call_id: CallId) -> Result<Option<Transcript>> {
        let row = sqlx::query(
            "SELECT call_id, tenant_id, content, segments FROM transcripts WHERE call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| {
            let segments_json: serde_json::Value = r.try_get("segments")?;
            let segments: Vec<TranscriptSegment> = serde_json::from_value(segments_json)
                .map_err(|e| crate::error::CallCoreError::internal(format!("segment decode: {e}")))?;
            Ok(Transcript {
                call_id: r.try_get("call_id")?,
                tenant_id: r.try_get("tenant_id")?,
                content: r.try_get("content")?,
                segments,
            })
        })
        .transpose()
    }
}

fn direction_str(direction: CallDirection) -> &'static str {
    match direction {
        CallDirection::Outbound => "outbound",
        CallDirection::Inbound => "inbound",
    }
}

fn hangup_by_str(hangup_by: HangupBy) -> String {
    match hangup_by {
        HangupBy::System => "system".to_string(),
        HangupBy::Agent => "agent".to_string(),
        HangupBy::Customer => "customer".to_string(),
        HangupBy::Other(s) => s,
    }
}

fn lifecycle_str(status: LifecycleStatus) -> &'static str {
    match status {
        LifecycleStatus::Initiated => "initiated",
        LifecycleStatus::Ringing => "ringing",
        LifecycleStatus::InProgress => "in-progress",
        LifecycleStatus::NoAnswer => "no-answer",
        LifecycleStatus::Busy => "busy",
        LifecycleStatus::CallDisconnected => "call-disconnected",
        LifecycleStatus::Completed => "completed",
        LifecycleStatus::Failed => "failed",
        LifecycleStatus::Cancelled => "cancelled",
    }
}

fn row_to_call(row: &sqlx::postgres::PgRow) -> Result<Call> {
    let direction_raw: String = row.try_get("direction")?;
    let direction = match direction_raw.as_str() {
        "outbound" => CallDirection::Outbound,
        _ => CallDirection::Inbound,
    };
    let lifecycle_raw: String = row.try_get("lifecycle_status")?;
    let lifecycle_status = LifecycleStatus::from_str(&lifecycle_raw).ok_or_else(|| {
        crate::error::CallCoreError::internal(format!(
            "unknown lifecycle status in storage: {lifecycle_raw}"
        ))
    })?;
    let hangup_by_raw: Option<String> = row.try_get("hangup_by")?;
    let hangup_by = hangup_by_raw.map(|s| HangupBy::from_provider_str(&s));

    Ok(Call {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        agent_id: row.try_get("agent_id")?,
        contact_id: row.try_get("contact_id")?,
        execution_id: row.try_get("execution_id")?,
        direction,
        phone: row.try_get("phone")?,
        lifecycle_status,
        initiated_at: row.try_get("initiated_at")?,
        ringing_started_at: row.try_get("ringing_started_at")?,
        call_answered_at: row.try_get("call_answered_at")?,
        call_disconnected_at: row.try_get("call_disconnected_at")?,
        completed_at: row.try_get("completed_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        duration_minutes: row.try_get("duration_minutes")?,
        credits_used: row.try_get("credits_used")?,
        hangup_by,
        hangup_reason: row.try_get("hangup_reason")?,
        hangup_provider_code: row.try_get("hangup_provider_code")?,
        provider_metadata: row.try_get("provider_metadata")?,
    })
}
