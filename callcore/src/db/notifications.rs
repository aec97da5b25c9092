//! Persistence for `notifications` and `notification_preferences`
//! (spec.md §4.8, §6.4).

use sqlx::Row;
use uuid::Uuid;

use crate::domain::{
    CampaignId, Notification, NotificationPreference, NotificationStatus, NotificationType,
    TenantId,
};
use crate::error::Result;

use super::DatabaseManager;

impl DatabaseManager {
    pub async fn notification_exists(&self, idempotency_key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM notifications WHERE idempotency_key = $1) AS e")
            .bind(idempotency_key)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("e")?)
    }

    /// spec.md §4.8 step 4: the unique constraint on `idempotency_key` is
    /// the race-safety net. A conflicting concurrent insert is treated as
    /// "already delivered", not as an error.
    pub async fn insert_notification(
        &self,
        tenant_id: TenantId,
        notification_type: NotificationType,
        recipient: &str,
        status: NotificationStatus,
        related_campaign_id: Option<CampaignId>,
        related_transaction_id: Option<uuid::Uuid>,
        payload: serde_json::Value,
        idempotency_key: &str,
        error: Option<&str>,
    ) -> Result<Option<Notification>> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO notifications
                (id, tenant_id, notification_type, recipient, status, related_campaign_id,
                 related_transaction_id, payload, idempotency_key, error, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                     CASE WHEN $5 = 'sent' THEN now() ELSE NULL END)
             ON CONFLICT (idempotency_key) DO NOTHING
             RETURNING id, tenant_id, notification_type, recipient, status, related_campaign_id,
                       related_transaction_id, payload, idempotency_key, error, sent_at",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(notification_type.as_str())
        .bind(recipient)
        .bind(status_str(status))
        .bind(related_campaign_id)
        .bind(related_transaction_id)
        .bind(payload)
        .bind(idempotency_key)
        .bind(error)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_notification).transpose()
    }

    pub async fn notification_history(
        &self,
        tenant_id: TenantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, notification_type, recipient, status, related_campaign_id,
                    related_transaction_id, payload, idempotency_key, error, sent_at
             FROM notifications WHERE tenant_id = $1
             ORDER BY COALESCE(sent_at, now()) DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    pub async fn preferences_for(&self, tenant_id: TenantId) -> Result<NotificationPreference> {
        let row = sqlx::query(
            "SELECT tenant_id, low_credit_alerts, credits_added_emails, campaign_summary_emails,
                    email_verification_reminders, marketing_emails
             FROM notification_preferences WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(r) => Ok(NotificationPreference {
                tenant_id: r.try_get("tenant_id")?,
                low_credit_alerts: r.try_get("low_credit_alerts")?,
                credits_added_emails: r.try_get("credits_added_emails")?,
                campaign_summary_emails: r.try_get("campaign_summary_emails")?,
                email_verification_reminders: r.try_get("email_verification_reminders")?,
                marketing_emails: r.try_get("marketing_emails")?,
            }),
            None => Ok(NotificationPreference {
                tenant_id,
                ..NotificationPreference::default()
            }),
        }
    }

    /// Partial update (spec.md §6.3 `PUT /notifications/preferences`).
    /// `None` fields are left unchanged, upserting a default row first if
    /// none exists yet.
    pub async fn update_preferences(
        &self,
        tenant_id: TenantId,
        low_credit_alerts: Option<bool>,
        credits_added_emails: Option<bool>,
        campaign_summary_emails: Option<bool>,
        email_verification_reminders: Option<bool>,
        marketing_emails: Option<bool>,
    ) -> Result<NotificationPreference> {
        let defaults = NotificationPreference::default();
        let row = sqlx::query(
            "INSERT INTO notification_preferences
                (tenant_id, low_credit_alerts, credits_added_emails, campaign_summary_emails,
                 email_verification_reminders, marketing_emails)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (tenant_id) DO UPDATE SET
                low_credit_alerts = COALESCE($2, notification_preferences.low_credit_alerts),
                credits_added_emails = COALESCE($3, notification_preferences.credits_added_emails),
                campaign_summary_emails = COALESCE($4, notification_preferences.campaign_summary_emails),
                email_verification_reminders = COALESCE($5, notification_preferences.email_verification_reminders),
                marketing_emails = COALESCE($6, notification_preferences.marketing_emails)
             RETURNING tenant_id, low_credit_alerts, credits_added_emails, campaign_summary_emails,
                       email_verification_reminders, marketing_emails",
        )
        .bind(tenant_id)
        .bind(low_credit_alerts.unwrap_or(defaults.low_credit_alerts))
        .bind(credits_added_emails.unwrap_or(defaults.credits_added_emails))
        .bind(campaign_summary_emails.unwrap_or(defaults.campaign_summary_emails))
        .bind(email_verification_reminders.unwrap_or(defaults.email_verification_reminders))
        .bind(marketing_emails.unwrap_or(defaults.marketing_emails))
        .fetch_one(self.pool())
        .await?;

        Ok(NotificationPreference {
            tenant_id: row.try_get("tenant_id")?,
            low_credit_alerts: row.try_get("low_credit_alerts")?,
            credits_added_emails: row.try_get("credits_added_emails")?,
            campaign_summary_emails: row.try_get("campaign_summary_emails")?,
            email_verification_reminders: row.try_get("email_verification_reminders")?,
            marketing_emails: row.try_get("marketing_emails")?,
        })
    }
}

fn status_str(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Sent => "sent",
        NotificationStatus::Failed => "failed",
        NotificationStatus::Skipped => "skipped",
    }
}

fn status_from_str(s: &str) -> Result<NotificationStatus> {
    Ok(match s {
        "sent" => NotificationStatus::Sent,
        "failed" => NotificationStatus::Failed,
        "skipped" => NotificationStatus::Skipped,
        other => {
            return Err(crate::error::CallCoreError::internal(format!(
                "unknown notification status in storage: {other}"
            )))
        }
    })
}

fn type_from_str(s: &str) -> Result<NotificationType> {
    Ok(match s {
        "email_verification" => NotificationType::EmailVerification,
        "email_verification_reminder" => NotificationType::EmailVerificationReminder,
        "credit_low_15" => NotificationType::CreditLow15,
        "credit_low_5" => NotificationType::CreditLow5,
        "credit_exhausted_0" => NotificationType::CreditExhausted0,
        "credits_added" => NotificationType::CreditsAdded,
        "campaign_summary" => NotificationType::CampaignSummary,
        "marketing" => NotificationType::Marketing,
        other => {
            return Err(crate::error::CallCoreError::internal(format!(
                "unknown notification type in storage: {other}"
            )))
        }
    })
}

fn row_to_notification(row: &sqlx::postgres::PgRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        notification_type: type_from_str(row.try_get::<String, _>("notification_type")?.as_str())?,
        recipient: row.try_get("recipient")?,
        status: status_from_str(row.try_get::<String, _>("status")?.as_str())?,
        related_campaign_id: row.try_get("related_campaign_id")?,
        related_transaction_id: row.try_get("related_transaction_id")?,
        payload: row.try_get("payload")?,
        idempotency_key: row.try_get("idempotency_key")?,
        error: row.try_get("error")?,
        sent_at: row.try_get("sent_at")?,
    })
}
