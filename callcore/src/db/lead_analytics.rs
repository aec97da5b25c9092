//! Persistence for `lead_analytics` (spec.md §4.7, §6.4).

use sqlx::Row;
use uuid::Uuid;

use crate::domain::{AnalysisType, CallId, LeadAnalytics, StatusTag, TenantId};
use crate::error::Result;

use super::DatabaseManager;

/// Everything `crate::llm::LlmExtractionOrchestrator` needs to persist
/// one individual or complete row, already validated/clamped.
#[derive(Debug, Clone)]
pub struct LeadAnalyticsWrite {
    pub tenant_id: TenantId,
    pub phone: String,
    pub call_id: Option<CallId>,
    pub analysis_type: AnalysisType,
    pub intent_score: u8,
    pub urgency_score: u8,
    pub budget_score: u8,
    pub fit_score: u8,
    pub engagement_score: u8,
    pub total_score: u8,
    pub status_tag: StatusTag,
    pub reasoning: serde_json::Value,
    pub cta_pricing_clicked: bool,
    pub cta_demo_clicked: bool,
    pub cta_followup_clicked: bool,
    pub cta_sample_clicked: bool,
    pub cta_escalated_to_human: bool,
    pub demo_book_datetime: Option<chrono::DateTime<chrono::Utc>>,
    pub previous_calls_analyzed: i32,
    pub latest_call_id: Option<CallId>,
}

impl DatabaseManager {
    pub async fn insert_individual_analysis(&self, w: &LeadAnalyticsWrite) -> Result<LeadAnalytics> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO lead_analytics
                (id, tenant_id, phone, call_id, analysis_type, intent_score, urgency_score,
                 budget_score, fit_score, engagement_score, total_score, status_tag, reasoning,
                 cta_pricing_clicked, cta_demo_clicked, cta_followup_clicked, cta_sample_clicked,
                 cta_escalated_to_human, demo_book_datetime, previous_calls_analyzed,
                 latest_call_id, analysis_timestamp)
             VALUES ($1, $2, $3, $4, 'individual', $5, $6, $7, $8, $9, $10, $11, $12,
                     $13, $14, $15, $16, $17, $18, $19, $20, now())
             RETURNING id, tenant_id, phone, call_id, analysis_type, intent_score, urgency_score,
                       budget_score, fit_score, engagement_score, total_score, status_tag, reasoning,
                       cta_pricing_clicked, cta_demo_clicked, cta_followup_clicked, cta_sample_clicked,
                       cta_escalated_to_human, demo_book_datetime, previous_calls_analyzed,
                       latest_call_id, analysis_timestamp",
        )
        .bind(id)
        .bind(w.tenant_id)
        .bind(&w.phone)
        .bind(w.call_id)
        .bind(w.intent_score as i16)
        .bind(w.urgency_score as i16)
        .bind(w.budget_score as i16)
        .bind(w.fit_score as i16)
        .bind(w.engagement_score as i16)
        .bind(w.total_score as i16)
        .bind(status_tag_str(w.status_tag))
        .bind(&w.reasoning)
        .bind(w.cta_pricing_clicked)
        .bind(w.cta_demo_clicked)
        .bind(w.cta_followup_clicked)
        .bind(w.cta_sample_clicked)
        .bind(w.cta_escalated_to_human)
        .bind(w.demo_book_datetime)
        .bind(w.previous_calls_analyzed)
        .bind(w.latest_call_id)
        .fetch_one(self.pool())
        .await?;

        row_to_lead_analytics(&row)
    }

    /// spec.md §4.7 step 5: upsert keyed on `(tenant, phone)` where
    /// `analysis_type = 'complete'` — the partial unique index named in
    /// §6.4.
    pub async fn upsert_complete_analysis(&self, w: &LeadAnalyticsWrite) -> Result<LeadAnalytics> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO lead_analytics
                (id, tenant_id, phone, call_id, analysis_type, intent_score, urgency_score,
                 budget_score, fit_score, engagement_score, total_score, status_tag, reasoning,
                 cta_pricing_clicked, cta_demo_clicked, cta_followup_clicked, cta_sample_clicked,
                 cta_escalated_to_human, demo_book_datetime, previous_calls_analyzed,
                 latest_call_id, analysis_timestamp)
             VALUES ($1, $2, $3, NULL, 'complete', $4, $5, $6, $7, $8, $9, $10, $11,
                     $12, $13, $14, $15, $16, $17, $18, $19, now())
             ON CONFLICT (tenant_id, phone) WHERE analysis_type = 'complete'
             DO UPDATE SET
                intent_score = EXCLUDED.intent_score,
                urgency_score = EXCLUDED.urgency_score,
                budget_score = EXCLUDED.budget_score,
                fit_score = EXCLUDED.fit_score,
                engagement_score = EXCLUDED.engagement_score,
                total_score = EXCLUDED.total_score,
                status_tag = EXCLUDED.status_tag,
                reasoning = EXCLUDED.reasoning,
                cta_pricing_clicked = EXCLUDED.cta_pricing_clicked,
                cta_demo_clicked = EXCLUDED.cta_demo_clicked,
                cta_followup_clicked = EXCLUDED.cta_followup_clicked,
                cta_sample_clicked = EXCLUDED.cta_sample_clicked,
                cta_escalated_to_human = EXCLUDED.cta_escalated_to_human,
                demo_book_datetime = EXCLUDED.demo_book_datetime,
                previous_calls_analyzed = EXCLUDED.previous_calls_analyzed,
                latest_call_id = EXCLUDED.latest_call_id,
                analysis_timestamp = now()
             RETURNING id, tenant_id, phone, call_id, analysis_type, intent_score, urgency_score,
                       budget_score, fit_score, engagement_score, total_score, status_tag, reasoning,
                       cta_pricing_clicked, cta_demo_clicked, cta_followup_clicked, cta_sample_clicked,
                       cta_escalated_to_human, demo_book_datetime, previous_calls_analyzed,
                       latest_call_id, analysis_timestamp",
        )
        .bind(id)
        .bind(w.tenant_id)
        .bind(&w.phone)
        .bind(w.intent_score as i16)
        .bind(w.urgency_score as i16)
        .bind(w.budget_score as i16)
        .bind(w.fit_score as i16)
        .bind(w.engagement_score as i16)
        .bind(w.total_score as i16)
        .bind(status_tag_str(w.status_tag))
        .bind(&w.reasoning)
        .bind(w.cta_pricing_clicked)
        .bind(w.cta_demo_clicked)
        .bind(w.cta_followup_clicked)
        .bind(w.cta_sample_clicked)
        .bind(w.cta_escalated_to_human)
        .bind(w.demo_book_datetime)
        .bind(w.previous_calls_analyzed)
        .bind(w.latest_call_id)
        .fetch_one(self.pool())
        .await?;

        row_to_lead_analytics(&row)
    }

    /// spec.md §4.7 step 2: the snapshot fed to the "complete" prompt as
    /// `previousAnalyses`.
    pub async fn list_individual_analyses(
        &self,
        tenant_id: TenantId,
        phone: &str,
    ) -> Result<Vec<LeadAnalytics>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, phone, call_id, analysis_type, intent_score, urgency_score,
                    budget_score, fit_score, engagement_score, total_score, status_tag, reasoning,
                    cta_pricing_clicked, cta_demo_clicked, cta_followup_clicked, cta_sample_clicked,
                    cta_escalated_to_human, demo_book_datetime, previous_calls_analyzed,
                    latest_call_id, analysis_timestamp
             FROM lead_analytics
             WHERE tenant_id = $1 AND phone = $2 AND analysis_type = 'individual'
             ORDER BY analysis_timestamp ASC",
        )
        .bind(tenant_id)
        .bind(phone)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_lead_analytics).collect()
    }
}

fn status_tag_str(tag: StatusTag) -> &'static str {
    match tag {
        StatusTag::Hot => "Hot",
        StatusTag::Warm => "Warm",
        StatusTag::Cold => "Cold",
    }
}

fn row_to_lead_analytics(row: &sqlx::postgres::PgRow) -> Result<LeadAnalytics> {
    let analysis_type_raw: String = row.try_get("analysis_type")?;
    let analysis_type = match analysis_type_raw.as_str() {
        "individual" => AnalysisType::Individual,
        "complete" => AnalysisType::Complete,
        other => {
            return Err(crate::error::CallCoreError::internal(format!(
                "unknown analysis_type in storage: {other}"
            )))
        }
    };
    let status_tag_raw: String = row.try_get("status_tag")?;
    let status_tag = StatusTag::parse(&status_tag_raw).ok_or_else(|| {
        crate::error::CallCoreError::internal(format!(
            "unknown status_tag in storage: {status_tag_raw}"
        ))
    })?;

    Ok(LeadAnalytics {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        phone: row.try_get("phone")?,
        call_id: row.try_get("call_id")?,
        analysis_type,
        intent_score: row.try_get::<i16, _>("intent_score")? as u8,
        urgency_score: row.try_get::<i16, _>("urgency_score")? as u8,
        budget_score: row.try_get::<i16, _>("budget_score")? as u8,
        fit_score: row.try_get::<i16, _>("fit_score")? as u8,
        engagement_score: row.try_get::<i16, _>("engagement_score")? as u8,
        total_score: row.try_get::<i16, _>("total_score")? as u8,
        status_tag,
        reasoning: row.try_get("reasoning")?,
        cta_pricing_clicked: row.try_get("cta_pricing_clicked")?,
        cta_demo_clicked: row.try_get("cta_demo_clicked")?,
        cta_followup_clicked: row.try_get("cta_followup_clicked")?,
        cta_sample_clicked: row.try_get("cta_sample_clicked")?,
        cta_escalated_to_human: row.try_get("cta_escalated_to_human")?,
        demo_book_datetime: row.try_get("demo_book_datetime")?,
        previous_calls_analyzed: row.try_get("previous_calls_analyzed")?,
        latest_call_id: row.try_get("latest_call_id")?,
        analysis_timestamp: row.try_get("analysis_timestamp")?,
    })
}
