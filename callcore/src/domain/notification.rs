use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CampaignId, NotificationId, TenantId};

/// spec.md §4.8's closed type taxonomy, one variant per row of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EmailVerification,
    EmailVerificationReminder,
    CreditLow15,
    CreditLow5,
    CreditExhausted0,
    CreditsAdded,
    CampaignSummary,
    Marketing,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::EmailVerificationReminder => "email_verification_reminder",
            Self::CreditLow15 => "credit_low_15",
            Self::CreditLow5 => "credit_low_5",
            Self::CreditExhausted0 => "credit_exhausted_0",
            Self::CreditsAdded => "credits_added",
            Self::CampaignSummary => "campaign_summary",
            Self::Marketing => "marketing",
        }
    }

    /// The preference bucket gating this type, or `None` if it is always
    /// sent (spec.md §4.8 table: `email_verification` is "(always on)").
    pub fn preference_bucket(&self) -> Option<&'static str> {
        match self {
            Self::EmailVerification => None,
            Self::EmailVerificationReminder => Some("email_verification_reminders"),
            Self::CreditLow15 | Self::CreditLow5 | Self::CreditExhausted0 => {
                Some("low_credit_alerts")
            }
            Self::CreditsAdded => Some("credits_added_emails"),
            Self::CampaignSummary => Some("campaign_summary_emails"),
            Self::Marketing => Some("marketing_emails"),
        }
    }
}

/// { id, tenant, type, recipient, status, relatedCampaign?,
/// relatedTransaction?, payload, idempotencyKey, error?, sentAt }
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub tenant_id: TenantId,
    pub notification_type: NotificationType,
    pub recipient: String,
    pub status: NotificationStatus,
    pub related_campaign_id: Option<CampaignId>,
    pub related_transaction_id: Option<uuid::Uuid>,
    pub payload: serde_json::Value,
    /// Unique — the sole deduplication mechanism (§4.8 step 1).
    pub idempotency_key: String,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed,
    Skipped,
}

/// Per-Tenant map of type-bucket → enabled, defaulting to enabled
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub tenant_id: TenantId,
    pub low_credit_alerts: bool,
    pub credits_added_emails: bool,
    pub campaign_summary_emails: bool,
    pub email_verification_reminders: bool,
    pub marketing_emails: bool,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            tenant_id: uuid::Uuid::nil(),
            low_credit_alerts: true,
            credits_added_emails: true,
            campaign_summary_emails: true,
            email_verification_reminders: true,
            marketing_emails: true,
        }
    }
}

impl NotificationPreference {
    pub fn bucket_enabled(&self, bucket: &str) -> bool {
        match bucket {
            "low_credit_alerts" => self.low_credit_alerts,
            "credits_added_emails" => self.credits_added_emails,
            "campaign_summary_emails" => self.campaign_summary_emails,
            "email_verification_reminders" => self.email_verification_reminders,
            "marketing_emails" => self.marketing_emails,
            // An unrecognized bucket name is a programmer error, not a
            // tenant choice — default open so a typo doesn't silently
            // suppress a notification type nobody opted out of.
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_verification_has_no_bucket() {
        assert_eq!(NotificationType::EmailVerification.preference_bucket(), None);
    }

    #[test]
    fn low_credit_variants_share_a_bucket() {
        assert_eq!(
            NotificationType::CreditLow15.preference_bucket(),
            NotificationType::CreditLow5.preference_bucket()
        );
        assert_eq!(
            NotificationType::CreditExhausted0.preference_bucket(),
            Some("low_credit_alerts")
        );
    }

    #[test]
    fn defaults_are_all_enabled() {
        let prefs = NotificationPreference::default();
        assert!(prefs.bucket_enabled("low_credit_alerts"));
        assert!(prefs.bucket_enabled("marketing_emails"));
    }
}
