use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, CampaignId, ContactId, TenantId};

/// { id, tenant, priority, enabled, business-hour override,
/// trigger-conditions, ordered-actions } (spec.md §3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoEngagementFlow {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub priority: i32,
    pub enabled: bool,
    pub business_hours_only: bool,
    pub conditions: Vec<TriggerCondition>,
    pub actions: Vec<TriggerAction>,
}

/// AND across conditions (spec.md §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub field: String,
    pub operator: TriggerOperator,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOperator {
    Equals,
    Any,
    Contains,
    NotEquals,
}

impl TriggerCondition {
    /// Evaluate this one condition against a contact's field map. Custom
    /// fields and the two named fields (`lead_source`, `entry_type`) are
    /// both looked up the same way — spec.md §4.10 calls out "structured
    /// custom-field lookups" alongside the named fields, not a separate
    /// code path.
    pub fn matches(&self, fields: &serde_json::Value) -> bool {
        let actual = fields.get(&self.field);
        match self.operator {
            TriggerOperator::Equals => actual == Some(&self.value),
            TriggerOperator::NotEquals => actual != Some(&self.value),
            TriggerOperator::Contains => match (actual, self.value.as_str()) {
                (Some(serde_json::Value::String(s)), Some(needle)) => s.contains(needle),
                (Some(serde_json::Value::Array(items)), _) => items.contains(&self.value),
                _ => false,
            },
            TriggerOperator::Any => match (actual, self.value.as_array()) {
                (Some(actual), Some(candidates)) => candidates.contains(actual),
                _ => false,
            },
        }
    }
}

/// Sum type over the four action kinds (spec.md §9 design note: "use a
/// tagged-variant... not a base class hierarchy").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerAction {
    Call {
        agent_id: AgentId,
        campaign_id: Option<CampaignId>,
    },
    Message {
        template: String,
    },
    Email {
        template: String,
    },
    Wait {
        until: DateTime<Utc>,
    },
}

/// A flow paused on a `Wait` action, persisted so the remaining
/// actions resume at `resume_at` instead of being dropped when the
/// evaluator returns (spec.md §4.10).
#[derive(Debug, Clone)]
pub struct TriggerContinuation {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub phone: String,
    pub flow_id: uuid::Uuid,
    pub next_action_index: usize,
    pub resume_at: DateTime<Utc>,
}

/// Evaluate an ordered list of conditions with AND semantics and the
/// "first matching flow wins" / "DNC aborts everything" priority policy
/// described in spec.md §4.10.
pub fn select_matching_flow<'a>(
    flows: &'a [AutoEngagementFlow],
    contact_has_dnc_tag: bool,
    fields: &serde_json::Value,
    contact_id: ContactId,
) -> Option<&'a AutoEngagementFlow> {
    let _ = contact_id; // kept for call-site clarity / future per-contact exclusion lists
    if contact_has_dnc_tag {
        return None;
    }
    let mut sorted: Vec<&AutoEngagementFlow> = flows.iter().filter(|f| f.enabled).collect();
    sorted.sort_by_key(|f| f.priority);
    sorted
        .into_iter()
        .find(|flow| flow.conditions.iter().all(|c| c.matches(fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow(priority: i32, field: &str, value: &str) -> AutoEngagementFlow {
        AutoEngagementFlow {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            priority,
            enabled: true,
            business_hours_only: false,
            conditions: vec![TriggerCondition {
                field: field.to_string(),
                operator: TriggerOperator::Equals,
                value: json!(value),
            }],
            actions: vec![],
        }
    }

    #[test]
    fn dnc_tag_aborts_all_flows() {
        let flows = vec![flow(1, "lead_source", "web")];
        let fields = json!({ "lead_source": "web" });
        assert!(select_matching_flow(&flows, true, &fields, uuid::Uuid::new_v4()).is_none());
    }

    #[test]
    fn first_matching_flow_by_ascending_priority_wins() {
        let flows = vec![flow(5, "lead_source", "web"), flow(1, "lead_source", "web")];
        let fields = json!({ "lead_source": "web" });
        let matched = select_matching_flow(&flows, false, &fields, uuid::Uuid::new_v4()).unwrap();
        assert_eq!(matched.priority, 1);
    }

    #[test]
    fn non_matching_conditions_are_skipped() {
        let flows = vec![flow(1, "lead_source", "web")];
        let fields = json!({ "lead_source": "referral" });
        assert!(select_matching_flow(&flows, false, &fields, uuid::Uuid::new_v4()).is_none());
    }

    #[test]
    fn contains_operator_checks_array_membership() {
        let cond = TriggerCondition {
            field: "tags".to_string(),
            operator: TriggerOperator::Contains,
            value: json!("vip"),
        };
        assert!(cond.matches(&json!({ "tags": ["vip", "east"] })));
        assert!(!cond.matches(&json!({ "tags": ["east"] })));
    }
}
