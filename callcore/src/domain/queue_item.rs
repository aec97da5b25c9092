use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, CallId, CampaignId, ContactId, QueueItemId, TenantId};

/// A pending request to place a Call (spec.md §3, §4.2).
///
/// Invariant: a `campaign` item has `campaign_id = Some(_)`; a `direct`
/// item has `campaign_id = None`. Enforced by [`QueueItemRecord::validate`]
/// rather than by the type system, because both kinds share one table
/// (spec.md: "the queue itself is one logical ordered set").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItemRecord {
    pub id: QueueItemId,
    pub tenant_id: TenantId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub agent_id: AgentId,
    pub phone: String,
    pub kind: QueueItemKind,
    pub priority: i32,
    pub position: i64,
    pub scheduled_for: DateTime<Utc>,
    pub status: QueueItemStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub call_id: Option<CallId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItemRecord {
    pub fn validate(&self) -> Result<(), String> {
        match (&self.kind, &self.campaign_id) {
            (QueueItemKind::Campaign, None) => {
                Err("a campaign-kind queue item must carry a campaign_id".to_string())
            }
            (QueueItemKind::Direct, Some(_)) => {
                Err("a direct-kind queue item must not carry a campaign_id".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    Direct,
    Campaign,
}

/// spec.md §4.2 state machine: queued → processing → {completed, failed};
/// queued → cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueItemStatus {
    /// Validates a transition against the state machine in spec.md §4.2.
    pub fn can_transition_to(&self, next: QueueItemStatus) -> bool {
        use QueueItemStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                // a failed reservation leaves the item queued, in place
                | (Processing, Queued)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_item_without_campaign_is_invalid() {
        let mut item = sample();
        item.kind = QueueItemKind::Campaign;
        item.campaign_id = None;
        assert!(item.validate().is_err());
    }

    #[test]
    fn direct_item_with_campaign_is_invalid() {
        let mut item = sample();
        item.kind = QueueItemKind::Direct;
        item.campaign_id = Some(uuid::Uuid::new_v4());
        assert!(item.validate().is_err());
    }

    #[test]
    fn state_machine_rejects_resurrecting_terminal_items() {
        assert!(!QueueItemStatus::Completed.can_transition_to(QueueItemStatus::Processing));
        assert!(!QueueItemStatus::Cancelled.can_transition_to(QueueItemStatus::Queued));
        assert!(QueueItemStatus::Queued.can_transition_to(QueueItemStatus::Processing));
        assert!(QueueItemStatus::Processing.can_transition_to(QueueItemStatus::Queued));
    }

    fn sample() -> QueueItemRecord {
        let now = Utc::now();
        QueueItemRecord {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            campaign_id: None,
            contact_id: None,
            agent_id: uuid::Uuid::new_v4(),
            phone: "+15551234567".to_string(),
            kind: QueueItemKind::Direct,
            priority: 100,
            position: 1,
            scheduled_for: now,
            status: QueueItemStatus::Queued,
            attempts: 0,
            last_error: None,
            call_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
