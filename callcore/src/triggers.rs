//! # Trigger Evaluator (spec.md §4.10)
//!
//! Runs on Contact creation. Selects at most one `AutoEngagementFlow`
//! per contact and executes its actions sequentially. Call-type actions
//! enqueue a campaign-kind `QueueItem`; wait actions persist the
//! remaining actions as a `TriggerContinuation` keyed on `scheduled_for`
//! so they resume later instead of being dropped; message/email actions
//! are modeled as placeholder external calls (§4.10: "modeled as
//! placeholder external calls here").

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::DatabaseManager;
use crate::domain::trigger::{select_matching_flow, AutoEngagementFlow, TriggerAction};
use crate::domain::{ContactId, TenantId};
use crate::error::Result;
use crate::queue::CallQueue;

#[derive(Clone)]
pub struct TriggerEvaluator {
    db: Arc<DatabaseManager>,
    queue: Arc<CallQueue>,
}

/// Outcome of running a contact's matched flow, one entry per action
/// attempted — the caller (webhook/API handler) logs or surfaces this,
/// it is never propagated as an error on its own.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Enqueued { queue_item_id: uuid::Uuid },
    Deferred { until: chrono::DateTime<Utc> },
    Placeholder { kind: &'static str, template: String },
}

impl TriggerEvaluator {
    pub fn new(db: Arc<DatabaseManager>, queue: Arc<CallQueue>) -> Self {
        Self { db, queue }
    }

    /// spec.md §4.10: DNC aborts everything; otherwise the first
    /// ascending-priority flow whose conditions all match runs, and only
    /// that one.
    pub async fn on_contact_created(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        phone: &str,
        fields: &serde_json::Value,
        contact_has_dnc_tag: bool,
    ) -> Result<Vec<ActionOutcome>> {
        let flows = self.db.enabled_flows_for_tenant(tenant_id).await?;
        let Some(flow) = select_matching_flow(&flows, contact_has_dnc_tag, fields, contact_id) else {
            if contact_has_dnc_tag {
                info!(%tenant_id, %contact_id, "DNC tag present, no auto-engagement flows run");
            }
            return Ok(vec![]);
        };

        info!(%tenant_id, %contact_id, flow_id = %flow.id, "auto-engagement flow matched");

        self.run_actions(tenant_id, contact_id, phone, flow, 0).await
    }

    /// spec.md §4.10: resumes flows paused on a `Wait` action whose
    /// `resume_at` has passed. Intended to be driven by the same
    /// external cron that drives `QueueProcessor::process_smart`.
    pub async fn resume_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.db.due_trigger_continuations(now).await?;
        let mut resumed = 0usize;

        for continuation in due {
            self.db.delete_trigger_continuation(continuation.id).await?;

            let Some(flow) = self.db.flow_by_id(continuation.flow_id).await? else {
                warn!(flow_id = %continuation.flow_id, "continuation references a deleted flow, dropping");
                continue;
            };

            self.run_actions(
                continuation.tenant_id,
                continuation.contact_id,
                &continuation.phone,
                &flow,
                continuation.next_action_index,
            )
            .await?;
            resumed += 1;
        }

        Ok(resumed)
    }

    /// Executes `flow.actions[start_index..]` in order. A `Wait` action
    /// persists everything after it as a `TriggerContinuation` and stops
    /// this pass; `resume_due` picks it back up once `resume_at` elapses.
    async fn run_actions(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        phone: &str,
        flow: &AutoEngagementFlow,
        start_index: usize,
    ) -> Result<Vec<ActionOutcome>> {
        let mut outcomes = Vec::with_capacity(flow.actions.len().saturating_sub(start_index));

        for (index, action) in flow.actions.iter().enumerate().skip(start_index) {
            match action {
                TriggerAction::Call { agent_id, campaign_id } => {
                    let Some(campaign_id) = campaign_id else {
                        warn!(flow_id = %flow.id, "call action has no campaign_id, skipping");
                        continue;
                    };
                    let item = self
                        .queue
                        .enqueue_campaign(tenant_id, *campaign_id, *agent_id, contact_id, phone, Utc::now())
                        .await?;
                    outcomes.push(ActionOutcome::Enqueued { queue_item_id: item.id });
                }
                TriggerAction::Wait { until } => {
                    outcomes.push(ActionOutcome::Deferred { until: *until });
                    self.db
                        .insert_trigger_continuation(tenant_id, contact_id, phone, flow.id, index + 1, *until)
                        .await?;
                    break;
                }
                TriggerAction::Message { template } => {
                    outcomes.push(ActionOutcome::Placeholder { kind: "message", template: template.clone() });
                }
                TriggerAction::Email { template } => {
                    outcomes.push(ActionOutcome::Placeholder { kind: "email", template: template.clone() });
                }
            }
        }

        Ok(outcomes)
    }
}
