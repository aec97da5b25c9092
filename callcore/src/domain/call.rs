use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, CallId, ContactId, PhoneNumberId, TenantId};

/// An attempt record (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub contact_id: Option<ContactId>,
    /// Unique constraint — the sole dedup key for webhooks (§4.5, §6.4).
    pub execution_id: Option<String>,
    pub direction: CallDirection,
    pub phone: String,
    pub lifecycle_status: LifecycleStatus,

    pub initiated_at: DateTime<Utc>,
    pub ringing_started_at: Option<DateTime<Utc>>,
    pub call_answered_at: Option<DateTime<Utc>>,
    pub call_disconnected_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub duration_seconds: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub credits_used: Option<i64>,

    pub hangup_by: Option<HangupBy>,
    pub hangup_reason: Option<String>,
    pub hangup_provider_code: Option<String>,

    /// Opaque provider payload blobs (§3), preserved verbatim.
    pub provider_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outbound,
    Inbound,
}

/// spec.md §3: initiated, ringing, in-progress, no-answer, busy,
/// call-disconnected, completed, failed, cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStatus {
    Initiated,
    Ringing,
    InProgress,
    NoAnswer,
    Busy,
    CallDisconnected,
    Completed,
    Failed,
    Cancelled,
}

impl LifecycleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::NoAnswer => "no-answer",
            Self::Busy => "busy",
            Self::CallDisconnected => "call-disconnected",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "initiated" => Self::Initiated,
            "ringing" => Self::Ringing,
            "in-progress" => Self::InProgress,
            "no-answer" => Self::NoAnswer,
            "busy" => Self::Busy,
            "call-disconnected" => Self::CallDisconnected,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HangupBy {
    System,
    Agent,
    Customer,
    Other(String),
}

impl HangupBy {
    pub fn from_provider_str(s: &str) -> Self {
        match s {
            "system" => Self::System,
            "agent" => Self::Agent,
            "customer" | "user" => Self::Customer,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Content + structured speaker segments tied 1:1 to a completed Call
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub content: String,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub role: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A short-lived reservation row (spec.md §3). Presence implies "this
/// slot counts toward caps" — see [`crate::concurrency`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSlot {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub kind: ActiveSlotKind,
    pub reserved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveSlotKind {
    Direct,
    Campaign,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_status_round_trips_through_str() {
        for s in [
            LifecycleStatus::Initiated,
            LifecycleStatus::Ringing,
            LifecycleStatus::InProgress,
            LifecycleStatus::NoAnswer,
            LifecycleStatus::Busy,
            LifecycleStatus::CallDisconnected,
            LifecycleStatus::Completed,
            LifecycleStatus::Failed,
            LifecycleStatus::Cancelled,
        ] {
            assert_eq!(LifecycleStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn only_terminal_statuses_are_terminal() {
        assert!(LifecycleStatus::Completed.is_terminal());
        assert!(LifecycleStatus::Failed.is_terminal());
        assert!(LifecycleStatus::Cancelled.is_terminal());
        assert!(!LifecycleStatus::InProgress.is_terminal());
        assert!(!LifecycleStatus::Ringing.is_terminal());
    }
}
