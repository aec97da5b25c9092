use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, CampaignId, TenantId};

/// A batch definition (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub status: CampaignStatus,
    /// Tenant-local HH:MM, interpreted in `timezone`.
    pub first_call_time: NaiveTime,
    pub last_call_time: NaiveTime,
    pub timezone: String,
    pub start_date: DateTime<Utc>,

    /// §B.5 supplement: aggregate counters, needed to drive the
    /// campaign-summary notification in §4.8.
    pub total_contacts: i64,
    pub completed_calls: i64,
    pub failed_calls: i64,
}

impl Campaign {
    /// §4.2 step 3: "misconfigured" if the window wraps midnight.
    /// §D.5: not supported, flagged rather than interpreted.
    pub fn is_misconfigured(&self) -> bool {
        self.first_call_time > self.last_call_time
    }

    /// §4.8: "when a Call completion causes its campaign's
    /// total_contacts == completed_calls and no processing/queued items
    /// remain" — the counters half of that condition.
    pub fn counters_indicate_complete(&self) -> bool {
        self.total_contacts > 0 && self.total_contacts == self.completed_calls + self.failed_calls
    }
}

/// spec.md §3: draft, active, paused, completed, cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// §4.3 refresh step 1 only considers active/paused campaigns.
    pub fn schedulable(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }

    /// §4.2 step 2 dispatch requires the campaign to be active (paused
    /// campaigns may still hold a wake time but never dispatch).
    pub fn dispatchable(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn campaign_with_window(first: &str, last: &str) -> Campaign {
        Campaign {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            agent_id: uuid::Uuid::new_v4(),
            status: CampaignStatus::Active,
            first_call_time: NaiveTime::parse_from_str(first, "%H:%M").unwrap(),
            last_call_time: NaiveTime::parse_from_str(last, "%H:%M").unwrap(),
            timezone: "Asia/Kolkata".to_string(),
            start_date: Utc::now(),
            total_contacts: 0,
            completed_calls: 0,
            failed_calls: 0,
        }
    }

    #[test]
    fn midnight_crossing_window_is_misconfigured() {
        assert!(campaign_with_window("22:00", "06:00").is_misconfigured());
        assert!(!campaign_with_window("09:00", "17:00").is_misconfigured());
    }

    #[test]
    fn summary_trigger_needs_nonzero_contacts() {
        let mut c = campaign_with_window("09:00", "17:00");
        assert!(!c.counters_indicate_complete());
        c.total_contacts = 5;
        c.completed_calls = 4;
        c.failed_calls = 1;
        assert!(c.counters_indicate_complete());
    }
}
