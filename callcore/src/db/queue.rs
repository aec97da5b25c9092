//! Persistence for `call_queue` rows (spec.md §4.2, §6.4). Ordering is
//! partially pushed to SQL (`ORDER BY priority DESC, position ASC,
//! created_at ASC`, matching the index named in §6.4) and partially done
//! in Rust — the campaign time-window check needs `chrono-tz` localized
//! arithmetic that doesn't belong in a query string, the same division
//! of labor the teacher uses for anything involving SIP URI parsing
//! inside `database/queues.rs`.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{
    AgentId, CallId, CampaignId, Contact, ContactId, QueueItemKind, QueueItemRecord,
    QueueItemStatus, TenantId,
};
use crate::error::Result;

use super::DatabaseManager;

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub direct_queued: i64,
    pub direct_processing: i64,
    pub campaign_queued: i64,
    pub campaign_processing: i64,
}

impl DatabaseManager {
    pub async fn enqueue_queue_item(
        &self,
        tenant_id: TenantId,
        campaign_id: Option<CampaignId>,
        contact_id: Option<ContactId>,
        agent_id: AgentId,
        phone: &str,
        kind: QueueItemKind,
        priority: i32,
        scheduled_for: DateTime<Utc>,
    ) -> Result<QueueItemRecord> {
        let mut tx = self.pool().begin().await?;

        let pos_row = sqlx::query(
            "SELECT COALESCE(MAX(position), 0) + 1 AS next_pos
             FROM call_queue WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&mut *tx)
        .await?;
        let position: i64 = pos_row.try_get("next_pos")?;

        let kind_str = kind_str(kind);
        let id = Uuid::new_v4();

        let row = sqlx::query(
            "INSERT INTO call_queue
                (id, tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority,
                 position, scheduled_for, status, attempts, last_error, call_id,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'queued', 0, NULL, NULL, now(), now())
             RETURNING id, tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority,
                       position, scheduled_for, status, attempts, last_error, call_id,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(contact_id)
        .bind(agent_id)
        .bind(phone)
        .bind(kind_str)
        .bind(priority)
        .bind(position)
        .bind(scheduled_for)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row_to_queue_item(&row)
    }

    /// spec.md §4.2 step 1 of `nextEligible`: the highest-precedence
    /// queued direct item for one tenant.
    pub async fn next_eligible_direct(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueItemRecord>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority,
                    position, scheduled_for, status, attempts, last_error, call_id,
                    created_at, updated_at
             FROM call_queue
             WHERE tenant_id = $1 AND kind = 'direct' AND status = 'queued'
               AND scheduled_for <= $2
             ORDER BY priority DESC, position ASC, created_at ASC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_queue_item).transpose()
    }

    /// Candidate campaign queue items for one tenant at `now`, not yet
    /// filtered by window — the caller (`crate::queue::CallQueue`)
    /// performs the localized window check and the final ordering.
    pub async fn candidate_campaign_items(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItemRecord>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority,
                    position, scheduled_for, status, attempts, last_error, call_id,
                    created_at, updated_at
             FROM call_queue
             WHERE tenant_id = $1 AND kind = 'campaign' AND status = 'queued'
               AND scheduled_for <= $2
             ORDER BY priority DESC, position ASC, created_at ASC",
        )
        .bind(tenant_id)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_queue_item).collect()
    }

    /// Conditional update implementing spec.md §4.2's `updateStatus` —
    /// `WHERE status = $expected` is the optimistic-concurrency guard
    /// from spec.md §5 ("Writes to QueueItem.status use conditional
    /// updates").
    pub async fn update_queue_item_status(
        &self,
        item_id: Uuid,
        expected: QueueItemStatus,
        next: QueueItemStatus,
        call_id: Option<CallId>,
        error: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE call_queue
             SET status = $1, call_id = COALESCE($2, call_id), last_error = $3,
                 attempts = attempts + CASE WHEN $1 = 'processing' THEN 1 ELSE 0 END,
                 updated_at = now()
             WHERE id = $4 AND status = $5",
        )
        .bind(status_str(next))
        .bind(call_id)
        .bind(error)
        .bind(item_id)
        .bind(status_str(expected))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn position_of(&self, item_id: Uuid) -> Result<Option<i64>> {
        let row = sqlx::query(
            "WITH target AS (
                SELECT tenant_id, kind, priority, position
                FROM call_queue WHERE id = $1
             )
             SELECT (
                SELECT COUNT(*) FROM call_queue q, target t
                WHERE q.tenant_id = t.tenant_id AND q.kind = t.kind AND q.status = 'queued'
                  AND (q.priority > t.priority
                       OR (q.priority = t.priority AND q.position < t.position))
             ) + 1 AS rank",
        )
        .bind(item_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_get("rank")?)),
            None => Ok(None),
        }
    }

    pub async fn stats_for_tenant(&self, tenant_id: TenantId) -> Result<QueueStats> {
        let rows = sqlx::query(
            "SELECT kind, status, COUNT(*) AS n FROM call_queue
             WHERE tenant_id = $1 AND kind IN ('direct', 'campaign')
               AND status IN ('queued', 'processing')
             GROUP BY kind, status",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match (kind.as_str(), status.as_str()) {
                ("direct", "queued") => stats.direct_queued = n,
                ("direct", "processing") => stats.direct_processing = n,
                ("campaign", "queued") => stats.campaign_queued = n,
                ("campaign", "processing") => stats.campaign_processing = n,
                _ => {}
            }
        }
        Ok(stats)
    }

    pub async fn cancel_queue_item(&self, item_id: Uuid, tenant_id: TenantId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE call_queue SET status = 'cancelled', updated_at = now()
             WHERE id = $1 AND tenant_id = $2 AND status = 'queued'",
        )
        .bind(item_id)
        .bind(tenant_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// §B.2 supplement: operator-driven retry re-enqueues a failed item
    /// as a fresh queued one at the back of the tenant's queue.
    pub async fn requeue_failed_item(&self, item_id: Uuid) -> Result<Option<QueueItemRecord>> {
        let existing = sqlx::query(
            "SELECT tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority
             FROM call_queue WHERE id = $1 AND status = 'failed'",
        )
        .bind(item_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = existing else {
            return Ok(None);
        };

        let tenant_id: TenantId = row.try_get("tenant_id")?;
        let campaign_id: Option<CampaignId> = row.try_get("campaign_id")?;
        let contact_id: Option<ContactId> = row.try_get("contact_id")?;
        let agent_id: AgentId = row.try_get("agent_id")?;
        let phone: String = row.try_get("phone")?;
        let kind_str: String = row.try_get("kind")?;
        let priority: i32 = row.try_get("priority")?;
        let kind = if kind_str == "direct" {
            QueueItemKind::Direct
        } else {
            QueueItemKind::Campaign
        };

        let fresh = self
            .enqueue_queue_item(
                tenant_id,
                campaign_id,
                contact_id,
                agent_id,
                &phone,
                kind,
                priority,
                Utc::now(),
            )
            .await?;
        Ok(Some(fresh))
    }

    /// spec.md §4.3 refresh step 4: direct work is eligible the instant
    /// any queued direct item exists, independent of tenant or campaign.
    pub async fn any_direct_item_queued(&self) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(
                SELECT 1 FROM call_queue
                WHERE kind = 'direct' AND status = 'queued' AND scheduled_for <= now()
             ) AS any_direct",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("any_direct")?)
    }

    /// spec.md §4.4 step 3: distinct tenants with eligible work right
    /// now (direct, or campaign inside window — the window half is
    /// filtered by the caller since it needs localized time-of-day).
    pub async fn tenants_with_queued_direct_items(&self) -> Result<Vec<TenantId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT tenant_id FROM call_queue
             WHERE kind = 'direct' AND status = 'queued' AND scheduled_for <= now()",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(|r| Ok(r.try_get("tenant_id")?)).collect()
    }

    pub async fn tenants_with_queued_campaign_items(&self) -> Result<Vec<TenantId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT tenant_id FROM call_queue
             WHERE kind = 'campaign' AND status = 'queued' AND scheduled_for <= now()",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(|r| Ok(r.try_get("tenant_id")?)).collect()
    }

    /// Looks up the queue item that produced a given `Call`, used by
    /// campaign-summary evaluation (spec.md §4.8) to recover the
    /// campaign a completed call belongs to — `Call` itself carries no
    /// `campaign_id` (spec.md §3 only puts that on `QueueItem`).
    pub async fn queue_item_by_call_id(&self, call_id: CallId) -> Result<Option<QueueItemRecord>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority,
                    position, scheduled_for, status, attempts, last_error, call_id,
                    created_at, updated_at
             FROM call_queue WHERE call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_queue_item).transpose()
    }

    pub async fn queue_item_by_id(&self, item_id: Uuid) -> Result<Option<QueueItemRecord>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, campaign_id, contact_id, agent_id, phone, kind, priority,
                    position, scheduled_for, status, attempts, last_error, call_id,
                    created_at, updated_at
             FROM call_queue WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_queue_item).transpose()
    }

    /// spec.md §4.8 "campaign summary emission": true while any
    /// queue item for this campaign is still queued or processing.
    pub async fn campaign_has_pending_items(&self, campaign_id: CampaignId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(
                SELECT 1 FROM call_queue
                WHERE campaign_id = $1 AND status IN ('queued', 'processing')
             ) AS pending",
        )
        .bind(campaign_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("pending")?)
    }

    pub async fn contact_by_id(&self, contact_id: ContactId) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, phone, name, email, company, tags,
                    is_auto_created, auto_creation_source, auto_created_from_call_id, created_at
             FROM contacts WHERE id = $1",
        )
        .bind(contact_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| {
            Ok(Contact {
                id: r.try_get("id")?,
                tenant_id: r.try_get("tenant_id")?,
                phone: r.try_get("phone")?,
                name: r.try_get("name")?,
                email: r.try_get("email")?,
                company: r.try_get("company")?,
                tags: r.try_get("tags")?,
                is_auto_created: r.try_get("is_auto_created")?,
                auto_creation_source: r.try_get("auto_creation_source")?,
                auto_created_from_call_id: r.try_get("auto_created_from_call_id")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
    }
}

fn kind_str(kind: QueueItemKind) -> &'static str {
    match kind {
        QueueItemKind::Direct => "direct",
        QueueItemKind::Campaign => "campaign",
    }
}

fn status_str(status: QueueItemStatus) -> &'static str {
    match status {
        QueueItemStatus::Queued => "queued",
        QueueItemStatus::Processing => "processing",
        QueueItemStatus::Completed => "completed",
        QueueItemStatus::Failed => "failed",
        QueueItemStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<QueueItemStatus> {
    Ok(match s {
        "queued" => QueueItemStatus::Queued,
        "processing" => QueueItemStatus::Processing,
        "completed" => QueueItemStatus::Completed,
        "failed" => QueueItemStatus::Failed,
        "cancelled" => QueueItemStatus::Cancelled,
        other => {
            return Err(crate::error::CallCoreError::internal(format!(
                "unknown queue item status in storage: {other}"
            )))
        }
    })
}

fn kind_from_str(s: &str) -> Result<QueueItemKind> {
    Ok(match s {
        "direct" => QueueItemKind::Direct,
        "campaign" => QueueItemKind::Campaign,
        other => {
            return Err(crate::error::CallCoreError::internal(format!(
                "unknown queue item kind in storage: {other}"
            )))
        }
    })
}

fn row_to_queue_item(row: &sqlx::postgres::PgRow) -> Result<QueueItemRecord> {
    Ok(QueueItemRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        campaign_id: row.try_get("campaign_id")?,
        contact_id: row.try_get("contact_id")?,
        agent_id: row.try_get("agent_id")?,
        phone: row.try_get("phone")?,
        kind: kind_from_str(row.try_get::<String, _>("kind")?.as_str())?,
        priority: row.try_get("priority")?,
        position: row.try_get("position")?,
        scheduled_for: row.try_get("scheduled_for")?,
        status: status_from_str(row.try_get::<String, _>("status")?.as_str())?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        call_id: row.try_get("call_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
