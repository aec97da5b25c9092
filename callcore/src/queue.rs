//! # Priority Call Queue (spec.md §4.2)
//!
//! `nextEligible` is the one operation worth slowing down for: it picks
//! between the single highest-priority direct item and the best
//! schedulable campaign item, where "schedulable" depends on a
//! timezone-localized time-of-day window that simply cannot live in a
//! `WHERE` clause without duplicating `chrono-tz`'s DST rules. The
//! teacher's `QueueManager::next_call` has the same two-tier shape
//! (reserved numbers before pooled ones); this keeps it and adds the
//! window gate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::db::DatabaseManager;
use crate::domain::{
    AgentId, CallId, CampaignId, ContactId, QueueItemKind, QueueItemRecord, QueueItemStatus,
    TenantId,
};
use crate::error::{CallCoreError, Result};

#[derive(Clone)]
pub struct CallQueue {
    db: Arc<DatabaseManager>,
    direct_priority: i32,
    campaign_priority: i32,
    named_contact_priority_boost: i32,
}

pub use crate::db::queue::QueueStats;

impl CallQueue {
    pub fn new(
        db: Arc<DatabaseManager>,
        direct_priority: i32,
        campaign_priority: i32,
        named_contact_priority_boost: i32,
    ) -> Self {
        Self {
            db,
            direct_priority,
            campaign_priority,
            named_contact_priority_boost,
        }
    }

    /// spec.md §4.2: direct items always outrank campaign items
    /// (`priority = 100` by default vs `0`). The named-contact boost is
    /// a campaign-only concept (§D.2); a direct call always gets
    /// `direct_priority` regardless of who the contact is, so it never
    /// ranks below another direct call.
    pub async fn enqueue_direct(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        contact_id: Option<ContactId>,
        phone: &str,
    ) -> Result<QueueItemRecord> {
        let priority = self.direct_priority;
        self.db
            .enqueue_queue_item(
                tenant_id,
                None,
                contact_id,
                agent_id,
                phone,
                QueueItemKind::Direct,
                priority,
                Utc::now(),
            )
            .await
    }

    /// spec.md §4.2: a campaign item's base priority is boosted by
    /// `named_contact_priority_boost` when the contact has a non-blank
    /// name (§D.1 resolution: named contacts jump ahead of anonymous
    /// numbers within the same campaign, but never ahead of direct
    /// calls).
    pub async fn enqueue_campaign(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        agent_id: AgentId,
        contact_id: ContactId,
        phone: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<QueueItemRecord> {
        let priority = self.campaign_priority_for(contact_id).await?;
        self.db
            .enqueue_queue_item(
                tenant_id,
                Some(campaign_id),
                Some(contact_id),
                agent_id,
                phone,
                QueueItemKind::Campaign,
                priority,
                scheduled_for,
            )
            .await
    }

    /// spec.md §4.2 / §D.2: a campaign item's base priority is boosted
    /// by `named_contact_priority_boost` when the contact has a
    /// non-blank name; the boost never applies outside the campaign
    /// path, so it can never push a campaign item above a direct one.
    async fn campaign_priority_for(&self, contact_id: ContactId) -> Result<i32> {
        let named = self
            .db
            .contact_by_id(contact_id)
            .await?
            .map(|c| c.has_display_name())
            .unwrap_or(false);
        Ok(if named {
            self.campaign_priority + self.named_contact_priority_boost
        } else {
            self.campaign_priority
        })
    }

    /// spec.md §4.2 `nextEligible`: direct items win outright; among
    /// campaign items, only those whose campaign is `Active` and whose
    /// local wall-clock time falls in `[first_call_time, last_call_time]`
    /// are candidates, ordered by priority desc, position asc, then
    /// creation order.
    pub async fn next_eligible(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueItemRecord>> {
        if let Some(direct) = self.db.next_eligible_direct(tenant_id, now).await? {
            debug!(%tenant_id, item_id = %direct.id, "direct item eligible");
            return Ok(Some(direct));
        }

        let candidates = self.db.candidate_campaign_items(tenant_id, now).await?;
        for item in candidates {
            let Some(campaign_id) = item.campaign_id else {
                continue;
            };
            let Some(campaign) = self.db.campaign_by_id(campaign_id).await? else {
                continue;
            };
            if !campaign.dispatchable() || campaign.is_misconfigured() {
                continue;
            }
            if !in_window(&campaign, now) {
                continue;
            }
            debug!(%tenant_id, item_id = %item.id, %campaign_id, "campaign item eligible");
            return Ok(Some(item));
        }

        Ok(None)
    }

    pub async fn update_status(
        &self,
        item: &QueueItemRecord,
        next: QueueItemStatus,
        call_id: Option<CallId>,
        error: Option<&str>,
    ) -> Result<bool> {
        if !item.status.can_transition_to(next) {
            warn!(item_id = %item.id, ?item.status, ?next, "rejected invalid queue transition");
            return Err(CallCoreError::queue(format!(
                "cannot transition queue item {} from {:?} to {:?}",
                item.id, item.status, next
            )));
        }
        self.db
            .update_queue_item_status(item.id, item.status, next, call_id, error)
            .await
    }

    pub async fn cancel(&self, item_id: uuid::Uuid, tenant_id: TenantId) -> Result<bool> {
        self.db.cancel_queue_item(item_id, tenant_id).await
    }

    pub async fn position_of(&self, item_id: uuid::Uuid) -> Result<Option<i64>> {
        self.db.position_of(item_id).await
    }

    pub async fn item_by_id(&self, item_id: uuid::Uuid) -> Result<Option<QueueItemRecord>> {
        self.db.queue_item_by_id(item_id).await
    }

    pub async fn stats_for(&self, tenant_id: TenantId) -> Result<QueueStats> {
        self.db.stats_for_tenant(tenant_id).await
    }

    /// §B.2 supplement: operator-triggered retry of a failed item.
    pub async fn retry_failed(&self, item_id: uuid::Uuid) -> Result<Option<QueueItemRecord>> {
        self.db.requeue_failed_item(item_id).await
    }
}

/// Localizes `now` into the campaign's timezone and checks it against
/// the tenant-local `[first_call_time, last_call_time]` window. A
/// malformed timezone name fails closed (not eligible) and is logged —
/// spec.md §7: "configuration and data errors fail the operation, they
/// never silently widen a window."
fn in_window(campaign: &crate::domain::Campaign, now: DateTime<Utc>) -> bool {
    let tz: Tz = match campaign.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(campaign_id = %campaign.id, tz = %campaign.timezone, "unparseable campaign timezone");
            return false;
        }
    };
    let local = now.with_timezone(&tz);
    let local_time = local.time();
    local_time >= campaign.first_call_time && local_time <= campaign.last_call_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use crate::domain::{Campaign, CampaignStatus};

    fn campaign_at(tz: &str, first: &str, last: &str) -> Campaign {
        Campaign {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            agent_id: uuid::Uuid::new_v4(),
            status: CampaignStatus::Active,
            first_call_time: NaiveTime::parse_from_str(first, "%H:%M").unwrap(),
            last_call_time: NaiveTime::parse_from_str(last, "%H:%M").unwrap(),
            timezone: tz.to_string(),
            start_date: Utc::now(),
            total_contacts: 0,
            completed_calls: 0,
            failed_calls: 0,
        }
    }

    #[test]
    fn unparseable_timezone_fails_closed() {
        let campaign = campaign_at("Not/A_Zone", "09:00", "17:00");
        assert!(!in_window(&campaign, Utc::now()));
    }

    #[test]
    fn window_check_uses_localized_wall_clock() {
        // Noon UTC on 2024-06-01 is 05:30 IST, outside a 09:00-17:00 window.
        let campaign = campaign_at("Asia/Kolkata", "09:00", "17:00");
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(!in_window(&campaign, now));

        // 10:00 UTC is 15:30 IST, inside the window.
        let now = DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(in_window(&campaign, now));
    }
}
