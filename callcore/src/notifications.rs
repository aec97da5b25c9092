//! # Notification Dispatcher (spec.md §4.8)
//!
//! One unified pipeline for every user-facing email. The idempotency
//! key is the sole deduplication mechanism (no time-windowed escalation
//! state on the tenant row, per §9's redesign note).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::db::DatabaseManager;
use crate::domain::{CampaignId, Notification, NotificationPreference, NotificationStatus, NotificationType, TenantId};
use crate::error::Result;

#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Arc<DatabaseManager>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Mailbox,
}

pub struct SendRequest<'a> {
    pub tenant_id: TenantId,
    pub recipient_email: &'a str,
    pub notification_type: NotificationType,
    pub related_campaign_id: Option<CampaignId>,
    pub related_transaction_id: Option<uuid::Uuid>,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub subject: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub delivered: bool,
}

impl NotificationDispatcher {
    pub fn new(
        db: Arc<DatabaseManager>,
        smtp_host: &str,
        smtp_port: u16,
        smtp_username: &str,
        smtp_password: &str,
        from_address: &str,
        send_timeout: Duration,
    ) -> Result<Self> {
        let creds = Credentials::new(smtp_username.to_string(), smtp_password.to_string());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| crate::error::CallCoreError::notification(format!("smtp relay config: {e}")))?
            .port(smtp_port)
            .credentials(creds)
            .timeout(Some(send_timeout))
            .build();

        let from_address = from_address
            .parse::<Mailbox>()
            .map_err(|e| crate::error::CallCoreError::notification(format!("invalid from address: {e}")))?;

        Ok(Self {
            db,
            mailer,
            from_address,
        })
    }

    /// spec.md §4.8 algorithm, steps 1-4.
    pub async fn send(&self, req: SendRequest<'_>, preferences: &NotificationPreference) -> Result<SendOutcome> {
        if self.db.notification_exists(&req.idempotency_key).await? {
            return Ok(SendOutcome { delivered: false });
        }

        if let Some(bucket) = req.notification_type.preference_bucket() {
            if !preferences.bucket_enabled(bucket) {
                self.db
                    .insert_notification(
                        req.tenant_id,
                        req.notification_type,
                        req.recipient_email,
                        NotificationStatus::Skipped,
                        req.related_campaign_id,
                        req.related_transaction_id,
                        req.payload.clone(),
                        &req.idempotency_key,
                        Some("User preference disabled"),
                    )
                    .await?;
                return Ok(SendOutcome { delivered: false });
            }
        }

        let message = match Message::builder()
            .from(self.from_address.clone())
            .to(req
                .recipient_email
                .parse::<Mailbox>()
                .map_err(|e| crate::error::CallCoreError::notification(format!("invalid recipient: {e}")))?)
            .subject(req.subject)
            .body(req.body.to_string())
        {
            Ok(m) => m,
            Err(e) => {
                return self.record_failure(&req, &format!("message build failed: {e}")).await;
            }
        };

        match self.mailer.send(message).await {
            Ok(_) => {
                let inserted = self
                    .db
                    .insert_notification(
                        req.tenant_id,
                        req.notification_type,
                        req.recipient_email,
                        NotificationStatus::Sent,
                        req.related_campaign_id,
                        req.related_transaction_id,
                        req.payload.clone(),
                        &req.idempotency_key,
                        None,
                    )
                    .await?;
                // spec.md §4.8 step 4: a losing concurrent inserter saw
                // its own row come back `None` from the conflicting
                // insert; the email was already sent by the winner, so
                // this is logged, not retried.
                if inserted.is_none() {
                    warn!(key = %req.idempotency_key, "lost the insert race after sending; treating as already delivered");
                }
                info!(tenant_id = %req.tenant_id, ?req.notification_type, "notification sent");
                Ok(SendOutcome { delivered: true })
            }
            Err(e) => self.record_failure(&req, &e.to_string()).await,
        }
    }

    async fn record_failure(&self, req: &SendRequest<'_>, error: &str) -> Result<SendOutcome> {
        warn!(tenant_id = %req.tenant_id, ?req.notification_type, error, "notification send failed");
        self.db
            .insert_notification(
                req.tenant_id,
                req.notification_type,
                req.recipient_email,
                NotificationStatus::Failed,
                req.related_campaign_id,
                req.related_transaction_id,
                req.payload.clone(),
                &req.idempotency_key,
                Some(error),
            )
            .await?;
        Ok(SendOutcome { delivered: false })
    }

    pub async fn preferences_for(&self, tenant_id: TenantId) -> Result<NotificationPreference> {
        self.db.preferences_for(tenant_id).await
    }

    pub async fn update_preferences(
        &self,
        tenant_id: TenantId,
        low_credit_alerts: Option<bool>,
        credits_added_emails: Option<bool>,
        campaign_summary_emails: Option<bool>,
        email_verification_reminders: Option<bool>,
        marketing_emails: Option<bool>,
    ) -> Result<NotificationPreference> {
        self.db
            .update_preferences(
                tenant_id,
                low_credit_alerts,
                credits_added_emails,
                campaign_summary_emails,
                email_verification_reminders,
                marketing_emails,
            )
            .await
    }

    pub async fn history(&self, tenant_id: TenantId, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        self.db.notification_history(tenant_id, limit, offset).await
    }
}

/// spec.md §4.8 "Low-credit evaluation at completion".
pub fn low_credit_notification_type(credits: i64) -> Option<NotificationType> {
    if credits <= 0 {
        Some(NotificationType::CreditExhausted0)
    } else if credits <= 5 {
        Some(NotificationType::CreditLow5)
    } else if credits <= 15 {
        Some(NotificationType::CreditLow15)
    } else {
        None
    }
}

/// The `{yyyy-mm-dd}`-dated idempotency key format from §4.8's table,
/// giving natural once-per-day semantics for the three low-credit types
/// and the email-verification-reminder type.
pub fn dated_idempotency_key(tenant_id: TenantId, notification_type: NotificationType) -> String {
    format!("{}:{}:{}", tenant_id, notification_type.as_str(), Utc::now().format("%Y-%m-%d"))
}

pub fn campaign_idempotency_key(tenant_id: TenantId, campaign_id: CampaignId) -> String {
    format!("{}:campaign_summary:{}", tenant_id, campaign_id)
}

pub fn transaction_idempotency_key(tenant_id: TenantId, transaction_id: uuid::Uuid) -> String {
    format!("{}:credits_added:{}", tenant_id, transaction_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_credit_thresholds_match_spec_boundaries() {
        assert_eq!(low_credit_notification_type(16), None);
        assert_eq!(low_credit_notification_type(15), Some(NotificationType::CreditLow15));
        assert_eq!(low_credit_notification_type(5), Some(NotificationType::CreditLow5));
        assert_eq!(low_credit_notification_type(0), Some(NotificationType::CreditExhausted0));
        assert_eq!(low_credit_notification_type(-3), Some(NotificationType::CreditExhausted0));
    }

    #[test]
    fn dated_key_embeds_todays_date() {
        let tenant = uuid::Uuid::new_v4();
        let key = dated_idempotency_key(tenant, NotificationType::CreditLow5);
        assert!(key.starts_with(&format!("{tenant}:credit_low_5:")));
    }
}
