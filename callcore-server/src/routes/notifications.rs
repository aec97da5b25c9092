//! spec.md §6.3: tenant-facing notification preferences and history.

use axum::extract::{Query, State};
use axum::Json;
use callcore::domain::{Notification, NotificationPreference, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    tenant: TenantId,
}

#[derive(Debug, Serialize)]
struct PreferencesResponse {
    low_credit_alerts: bool,
    credits_added_emails: bool,
    campaign_summary_emails: bool,
    email_verification_reminders: bool,
    marketing_emails: bool,
}

impl From<NotificationPreference> for PreferencesResponse {
    fn from(p: NotificationPreference) -> Self {
        Self {
            low_credit_alerts: p.low_credit_alerts,
            credits_added_emails: p.credits_added_emails,
            campaign_summary_emails: p.campaign_summary_emails,
            email_verification_reminders: p.email_verification_reminders,
            marketing_emails: p.marketing_emails,
        }
    }
}

/// `GET /notifications/preferences`.
pub async fn get_preferences(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
) -> ApiResult<Json<PreferencesResponse>> {
    let prefs = state.core.notifications.preferences_for(q.tenant).await?;
    Ok(Json(prefs.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    tenant: TenantId,
    #[serde(default)]
    low_credit_alerts: Option<bool>,
    #[serde(default)]
    credits_added_emails: Option<bool>,
    #[serde(default)]
    campaign_summary_emails: Option<bool>,
    #[serde(default)]
    email_verification_reminders: Option<bool>,
    #[serde(default)]
    marketing_emails: Option<bool>,
}

/// `PUT /notifications/preferences` — partial update; omitted fields
/// keep their stored value.
pub async fn update_preferences(
    State(state): State<AppState>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> ApiResult<Json<PreferencesResponse>> {
    let prefs = state
        .core
        .notifications
        .update_preferences(
            req.tenant,
            req.low_credit_alerts,
            req.credits_added_emails,
            req.campaign_summary_emails,
            req.email_verification_reminders,
            req.marketing_emails,
        )
        .await?;
    Ok(Json(prefs.into()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    tenant: TenantId,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /notifications/history?limit&offset`.
pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let rows = state.core.notifications.history(q.tenant, q.limit, q.offset).await?;
    Ok(Json(rows))
}
