//! # LLM Extraction Orchestrator (spec.md §4.7 — "Dual Analysis")
//!
//! Produces an `individual` analysis for one call and upserts a rolling
//! `complete` analysis per `(tenant, phone)`. The HTTP collaborator is
//! intentionally separate (`LlmClient`) from the orchestration
//! (`LlmExtractionOrchestrator`), the same split the teacher uses
//! between `media_engine` (raw transport) and `call_handler`
//! (business sequencing).

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::db::lead_analytics::LeadAnalyticsWrite;
use crate::db::DatabaseManager;
use crate::domain::{
    AnalysisType, CallId, LeadAnalytics, StatusTag, TenantId, call::TranscriptSegment,
    lead_analytics::clamp_score,
};
use crate::error::{CallCoreError, Result};

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

/// Raw shape returned by the LLM provider (spec.md §4.7 mapping
/// contract). Treated as untrusted: every numeric field is clamped and
/// every enum validated before it becomes a [`LeadAnalytics`] row.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmExtractionOutput {
    pub intent_score: f64,
    pub urgency_score: f64,
    pub budget_score: f64,
    pub fit_score: f64,
    pub engagement_score: f64,
    pub total_score: f64,
    pub lead_status_tag: String,
    #[serde(default)]
    pub reasoning: serde_json::Value,
    #[serde(default)]
    pub extraction: LlmExtractedFields,
    #[serde(default)]
    pub cta_pricing_clicked: Option<serde_json::Value>,
    #[serde(default)]
    pub cta_demo_clicked: Option<serde_json::Value>,
    #[serde(default)]
    pub cta_followup_clicked: Option<serde_json::Value>,
    #[serde(default)]
    pub cta_sample_clicked: Option<serde_json::Value>,
    #[serde(default)]
    pub cta_escalated_to_human: Option<serde_json::Value>,
    #[serde(default)]
    pub demo_book_datetime: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmExtractedFields {
    pub name: Option<String>,
    pub email_address: Option<String>,
    pub company_name: Option<String>,
    #[serde(default)]
    pub smartnotification: Option<serde_json::Value>,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration, max_retries: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallCoreError::llm(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_retries,
        })
    }

    /// spec.md §4.7 step 1: up to 3 attempts with exponential backoff
    /// (1s, 2s, 4s) on HTTP 429/500/503 or timeouts.
    pub async fn extract(&self, prompt_id: &str, body: serde_json::Value) -> Result<LlmExtractionOutput> {
        let url = format!("{}/extract", self.base_url);
        let mut attempt = 0u32;
        let mut backoff = Duration::from_secs(1);

        loop {
            attempt += 1;
            let result = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "prompt_id": prompt_id, "input": body }))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<LlmExtractionOutput>()
                        .await
                        .map_err(|e| CallCoreError::llm(format!("malformed extraction response: {e}")));
                }
                Ok(response) if is_retryable_status(response.status().as_u16()) && attempt <= self.max_retries => {
                    warn!(status = %response.status(), attempt, "llm extraction retrying");
                }
                Ok(response) => {
                    return Err(CallCoreError::llm(format!(
                        "llm extraction failed with status {}",
                        response.status()
                    )));
                }
                Err(e) if e.is_timeout() && attempt <= self.max_retries => {
                    warn!(attempt, "llm extraction timed out, retrying");
                }
                Err(e) => return Err(CallCoreError::llm(format!("llm extraction request failed: {e}"))),
            }

            sleep(backoff).await;
            backoff *= 2;
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 503)
}

#[derive(Clone)]
pub struct LlmExtractionOrchestrator {
    db: Arc<DatabaseManager>,
    client: LlmClient,
    default_individual_prompt_id: String,
    default_complete_prompt_id: String,
}

impl LlmExtractionOrchestrator {
    pub fn new(
        db: Arc<DatabaseManager>,
        client: LlmClient,
        default_individual_prompt_id: String,
        default_complete_prompt_id: String,
    ) -> Self {
        Self {
            db,
            client,
            default_individual_prompt_id,
            default_complete_prompt_id,
        }
    }

    /// spec.md §4.7 full algorithm. Retries are exhausted inside
    /// [`LlmClient::extract`]; a failure here is non-fatal to the caller
    /// (§4.6 step 5: "if that step fails, log but do not abort billing")
    /// so this returns `Ok(None)` rather than propagating on exhaustion.
    pub async fn process_completed_call(
        &self,
        tenant_id: TenantId,
        call_id: CallId,
        phone: &str,
        execution_id: &str,
        transcript_text: &str,
        transcript_segments: &[TranscriptSegment],
        individual_prompt_override: Option<&str>,
        complete_prompt_override: Option<&str>,
    ) -> Result<Option<(LeadAnalytics, LeadAnalytics)>> {
        let individual_prompt = individual_prompt_override.unwrap_or(&self.default_individual_prompt_id);

        let individual_raw = match self
            .client
            .extract(
                individual_prompt,
                serde_json::json!({
                    "transcript": transcript_text,
                    "segments": transcript_segments,
                    "execution_id": execution_id,
                    "phone": phone,
                }),
            )
            .await
        {
            Ok(output) => output,
            Err(err) => {
                warn!(%call_id, error = %err, "llm extraction exhausted retries, skipping analytics");
                return Ok(None);
            }
        };

        // spec.md §4.7 step 2/5: snapshot the prior individual analyses
        // *before* inserting this call's row, so `previous` excludes the
        // current call and `previous.len() + 1` (step 5) counts it
        // exactly once.
        let previous = self.db.list_individual_analyses(tenant_id, phone).await?;

        let individual_write = map_extraction(tenant_id, phone, Some(call_id), AnalysisType::Individual, &individual_raw)?;
        let individual_row = self.db.insert_individual_analysis(&individual_write).await?;

        let complete_prompt = complete_prompt_override.unwrap_or(&self.default_complete_prompt_id);
        let complete_raw = match self
            .client
            .extract(
                complete_prompt,
                serde_json::json!({
                    "transcript": transcript_text,
                    "previous_analyses": previous,
                }),
            )
            .await
        {
            Ok(output) => output,
            Err(err) => {
                warn!(%call_id, error = %err, "llm complete-analysis extraction failed, individual row kept");
                return Ok(None);
            }
        };

        let mut complete_write = map_extraction(tenant_id, phone, None, AnalysisType::Complete, &complete_raw)?;
        complete_write.previous_calls_analyzed = previous.len() as i32 + 1;
        complete_write.latest_call_id = Some(call_id);
        let complete_row = self.db.upsert_complete_analysis(&complete_write).await?;

        info!(%call_id, %tenant_id, "dual analysis complete");
        Ok(Some((individual_row, complete_row)))
    }
}

/// spec.md §4.7 mapping contract: `Yes/No/null` strings normalized to
/// `true/false/null`, `demo_book_datetime` parsed as ISO-8601, scores
/// clamped, `lead_status_tag` validated against the closed enum.
fn map_extraction(
    tenant_id: TenantId,
    phone: &str,
    call_id: Option<CallId>,
    analysis_type: AnalysisType,
    raw: &LlmExtractionOutput,
) -> Result<LeadAnalyticsWrite> {
    let status_tag = StatusTag::parse(&raw.lead_status_tag).unwrap_or(StatusTag::Cold);
    let demo_book_datetime = raw
        .demo_book_datetime
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc));

    Ok(LeadAnalyticsWrite {
        tenant_id,
        phone: phone.to_string(),
        call_id,
        analysis_type,
        intent_score: clamp_score(raw.intent_score),
        urgency_score: clamp_score(raw.urgency_score),
        budget_score: clamp_score(raw.budget_score),
        fit_score: clamp_score(raw.fit_score),
        engagement_score: clamp_score(raw.engagement_score),
        total_score: clamp_score(raw.total_score),
        status_tag,
        reasoning: raw.reasoning.clone(),
        cta_pricing_clicked: normalize_yes_no(&raw.cta_pricing_clicked),
        cta_demo_clicked: normalize_yes_no(&raw.cta_demo_clicked),
        cta_followup_clicked: normalize_yes_no(&raw.cta_followup_clicked),
        cta_sample_clicked: normalize_yes_no(&raw.cta_sample_clicked),
        cta_escalated_to_human: normalize_yes_no(&raw.cta_escalated_to_human),
        demo_book_datetime,
        previous_calls_analyzed: 0,
        latest_call_id: None,
    })
}

fn normalize_yes_no(value: &Option<serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_yes_no_handles_string_and_bool_and_null() {
        assert!(normalize_yes_no(&Some(serde_json::json!("Yes"))));
        assert!(!normalize_yes_no(&Some(serde_json::json!("No"))));
        assert!(normalize_yes_no(&Some(serde_json::json!(true))));
        assert!(!normalize_yes_no(&None));
    }

    #[test]
    fn map_extraction_clamps_out_of_range_scores_and_falls_back_unknown_tag() {
        let raw = LlmExtractionOutput {
            intent_score: 150.0,
            urgency_score: -10.0,
            budget_score: 50.0,
            fit_score: 50.0,
            engagement_score: 50.0,
            total_score: 50.0,
            lead_status_tag: "Lukewarm".to_string(),
            reasoning: serde_json::json!({}),
            extraction: LlmExtractedFields::default(),
            cta_pricing_clicked: None,
            cta_demo_clicked: None,
            cta_followup_clicked: None,
            cta_sample_clicked: None,
            cta_escalated_to_human: None,
            demo_book_datetime: None,
        };
        let write = map_extraction(
            uuid::Uuid::new_v4(),
            "+15551234567",
            None,
            AnalysisType::Individual,
            &raw,
        )
        .unwrap();
        assert_eq!(write.intent_score, 100);
        assert_eq!(write.urgency_score, 0);
        assert_eq!(write.status_tag, StatusTag::Cold);
    }
}
