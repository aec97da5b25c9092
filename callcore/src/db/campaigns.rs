//! Persistence for `call_campaigns` rows (spec.md §3, §4.3).

use chrono::{DateTime, NaiveTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{AgentId, Campaign, CampaignId, CampaignStatus, TenantId};
use crate::error::Result;

use super::DatabaseManager;

impl DatabaseManager {
    pub async fn campaign_by_id(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, agent_id, status, first_call_time, last_call_time,
                    timezone, start_date, total_contacts, completed_calls, failed_calls
             FROM call_campaigns WHERE id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_campaign).transpose()
    }

    /// spec.md §4.3 step 1: every active or paused campaign, across all
    /// tenants — the schedule cache refresh sweeps the whole table.
    pub async fn schedulable_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, agent_id, status, first_call_time, last_call_time,
                    timezone, start_date, total_contacts, completed_calls, failed_calls
             FROM call_campaigns WHERE status IN ('active', 'paused')",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_campaign).collect()
    }

    /// spec.md §4.3 refresh step 1: active/paused campaigns with at
    /// least one queued campaign-kind item.
    pub async fn campaigns_with_queued_items(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            "SELECT DISTINCT c.id, c.tenant_id, c.agent_id, c.status, c.first_call_time,
                    c.last_call_time, c.timezone, c.start_date, c.total_contacts,
                    c.completed_calls, c.failed_calls
             FROM call_campaigns c
             JOIN call_queue q ON q.campaign_id = c.id
             WHERE c.status IN ('active', 'paused') AND q.status = 'queued'",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_campaign).collect()
    }

    pub async fn create_campaign(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        first_call_time: NaiveTime,
        last_call_time: NaiveTime,
        timezone: &str,
        start_date: DateTime<Utc>,
        total_contacts: i64,
    ) -> Result<Campaign> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO call_campaigns
                (id, tenant_id, agent_id, status, first_call_time, last_call_time,
                 timezone, start_date, total_contacts, completed_calls, failed_calls)
             VALUES ($1, $2, $3, 'draft', $4, $5, $6, $7, $8, 0, 0)
             RETURNING id, tenant_id, agent_id, status, first_call_time, last_call_time,
                       timezone, start_date, total_contacts, completed_calls, failed_calls",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(agent_id)
        .bind(first_call_time)
        .bind(last_call_time)
        .bind(timezone)
        .bind(start_date)
        .bind(total_contacts)
        .fetch_one(self.pool())
        .await?;

        row_to_campaign(&row)
    }

    pub async fn set_campaign_status(
        &self,
        campaign_id: CampaignId,
        status: CampaignStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE call_campaigns SET status = $1 WHERE id = $2")
            .bind(status_str(status))
            .bind(campaign_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// spec.md §4.8: called on every terminal `Call` completion tied to a
    /// campaign, to keep `counters_indicate_complete` accurate.
    pub async fn record_campaign_call_outcome(
        &self,
        campaign_id: CampaignId,
        succeeded: bool,
    ) -> Result<Campaign> {
        let row = if succeeded {
            sqlx::query(
                "UPDATE call_campaigns SET completed_calls = completed_calls + 1
                 WHERE id = $1
                 RETURNING id, tenant_id, agent_id, status, first_call_time, last_call_time,
                           timezone, start_date, total_contacts, completed_calls, failed_calls",
            )
        } else {
            sqlx::query(
                "UPDATE call_campaigns SET failed_calls = failed_calls + 1
                 WHERE id = $1
                 RETURNING id, tenant_id, agent_id, status, first_call_time, last_call_time,
                           timezone, start_date, total_contacts, completed_calls, failed_calls",
            )
        }
        .bind(campaign_id)
        .fetch_one(self.pool())
        .await?;

        row_to_campaign(&row)
    }
}

fn status_str(status: CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Draft => "draft",
        CampaignStatus::Active => "active",
        CampaignStatus::Paused => "paused",
        CampaignStatus::Completed => "completed",
        CampaignStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<CampaignStatus> {
    Ok(match s {
        "draft" => CampaignStatus::Draft,
        "active" => CampaignStatus::Active,
        "paused" => CampaignStatus::Paused,
        "completed" => CampaignStatus::Completed,
        "cancelled" => CampaignStatus::Cancelled,
        other => {
            return Err(crate::error::CallCoreError::internal(format!(
                "unknown campaign status in storage: {other}"
            )))
        }
    })
}

fn row_to_campaign(row: &sqlx::postgres::PgRow) -> Result<Campaign> {
    Ok(Campaign {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        agent_id: row.try_get("agent_id")?,
        status: status_from_str(row.try_get::<String, _>("status")?.as_str())?,
        first_call_time: row.try_get("first_call_time")?,
        last_call_time: row.try_get("last_call_time")?,
        timezone: row.try_get("timezone")?,
        start_date: row.try_get("start_date")?,
        total_contacts: row.try_get("total_contacts")?,
        completed_calls: row.try_get("completed_calls")?,
        failed_calls: row.try_get("failed_calls")?,
    })
}
