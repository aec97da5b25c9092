use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CallId, TenantId};

/// The dual-analysis artifact (spec.md §3, §4.7).
///
/// Uniqueness (enforced at the storage layer, §6.4): for
/// `analysis_type = Complete`, exactly one row per `(tenant_id, phone)`;
/// for `Individual`, one per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadAnalytics {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub phone: String,
    /// `None` for `analysis_type = Complete` — it aggregates many calls.
    pub call_id: Option<CallId>,
    pub analysis_type: AnalysisType,

    pub intent_score: u8,
    pub urgency_score: u8,
    pub budget_score: u8,
    pub fit_score: u8,
    pub engagement_score: u8,
    pub total_score: u8,
    pub status_tag: StatusTag,

    /// Untrusted LLM output, preserved verbatim (§4.7 "Safety").
    pub reasoning: serde_json::Value,

    pub cta_pricing_clicked: bool,
    pub cta_demo_clicked: bool,
    pub cta_followup_clicked: bool,
    pub cta_sample_clicked: bool,
    pub cta_escalated_to_human: bool,
    pub demo_book_datetime: Option<DateTime<Utc>>,

    pub previous_calls_analyzed: i32,
    pub latest_call_id: Option<CallId>,
    pub analysis_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Individual,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTag {
    Hot,
    Warm,
    Cold,
}

impl StatusTag {
    /// §4.7 mapping contract: validated against the closed enum, not
    /// trusted verbatim from the LLM.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Hot" => Some(Self::Hot),
            "Warm" => Some(Self::Warm),
            "Cold" => Some(Self::Cold),
            _ => None,
        }
    }
}

/// Clamp an LLM-reported score into `[0, 100]` per §4.7's safety
/// requirement, saturating rather than rejecting the whole payload.
pub fn clamp_score(raw: f64) -> u8 {
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_score_saturates_both_directions() {
        assert_eq!(clamp_score(-5.0), 0);
        assert_eq!(clamp_score(150.0), 100);
        assert_eq!(clamp_score(42.4), 42);
        assert_eq!(clamp_score(42.6), 43);
    }

    #[test]
    fn status_tag_rejects_unknown_values() {
        assert_eq!(StatusTag::parse("Hot"), Some(StatusTag::Hot));
        assert_eq!(StatusTag::parse("Lukewarm"), None);
    }
}
