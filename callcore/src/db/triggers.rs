//! Persistence for `auto_engagement_flows` and paused-flow
//! continuations (spec.md §4.10).

use sqlx::Row;

use crate::domain::{AutoEngagementFlow, ContactId, TenantId, TriggerContinuation};
use crate::error::Result;

use super::DatabaseManager;

fn decode_flow(row: &sqlx::postgres::PgRow) -> Result<AutoEngagementFlow> {
    let conditions_json: serde_json::Value = row.try_get("conditions")?;
    let actions_json: serde_json::Value = row.try_get("actions")?;
    let conditions = serde_json::from_value(conditions_json)
        .map_err(|e| crate::error::CallCoreError::internal(format!("trigger conditions decode: {e}")))?;
    let actions = serde_json::from_value(actions_json)
        .map_err(|e| crate::error::CallCoreError::internal(format!("trigger actions decode: {e}")))?;
    Ok(AutoEngagementFlow {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        business_hours_only: row.try_get("business_hours_only")?,
        conditions,
        actions,
    })
}

impl DatabaseManager {
    /// spec.md §4.10: "enumerate the tenant's enabled auto-engagement
    /// flows sorted by ascending priority" — the ordering the caller
    /// (`crate::triggers::TriggerEvaluator`) relies on, though it
    /// re-sorts defensively since `select_matching_flow` doesn't trust
    /// storage ordering either.
    pub async fn enabled_flows_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<AutoEngagementFlow>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, priority, enabled, business_hours_only, conditions, actions
             FROM auto_engagement_flows
             WHERE tenant_id = $1 AND enabled = true
             ORDER BY priority ASC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(decode_flow).collect()
    }

    pub async fn flow_by_id(&self, flow_id: uuid::Uuid) -> Result<Option<AutoEngagementFlow>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, priority, enabled, business_hours_only, conditions, actions
             FROM auto_engagement_flows WHERE id = $1",
        )
        .bind(flow_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(decode_flow).transpose()
    }

    /// Persists a flow paused on a `Wait` action so its remaining
    /// actions resume at `resume_at` (spec.md §4.10: "wait actions
    /// schedule the next action via `scheduledFor`").
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_trigger_continuation(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        phone: &str,
        flow_id: uuid::Uuid,
        next_action_index: usize,
        resume_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<uuid::Uuid> {
        let id = uuid::Uuid::new_v4();
        sqlx::query(
            "INSERT INTO trigger_continuations
                (id, tenant_id, contact_id, phone, flow_id, next_action_index, resume_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(contact_id)
        .bind(phone)
        .bind(flow_id)
        .bind(next_action_index as i32)
        .bind(resume_at)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Continuations whose `resume_at` has passed — the work the
    /// "wait" half of a flow left behind.
    pub async fn due_trigger_continuations(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<TriggerContinuation>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, contact_id, phone, flow_id, next_action_index, resume_at
             FROM trigger_continuations
             WHERE resume_at <= $1
             ORDER BY resume_at ASC",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let next_action_index: i32 = row.try_get("next_action_index")?;
                Ok(TriggerContinuation {
                    id: row.try_get("id")?,
                    tenant_id: row.try_get("tenant_id")?,
                    contact_id: row.try_get("contact_id")?,
                    phone: row.try_get("phone")?,
                    flow_id: row.try_get("flow_id")?,
                    next_action_index: next_action_index.max(0) as usize,
                    resume_at: row.try_get("resume_at")?,
                })
            })
            .collect()
    }

    /// Idempotent: deleting an already-consumed continuation is not an
    /// error.
    pub async fn delete_trigger_continuation(&self, id: uuid::Uuid) -> Result<()> {
        sqlx::query("DELETE FROM trigger_continuations WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
