//! Cross-module scenarios S4 ("idempotent completion"), S5 ("LLM
//! outage mid-completion"), and S6 ("notification preference
//! disabled") from spec.md §8, driven through the real
//! `WebhookIngestion::handle_completion` against a live Postgres.

mod common;

use std::sync::Arc;
use std::time::Duration;

use callcore::billing::BillingHook;
use callcore::clock::SystemClock;
use callcore::concurrency::ConcurrencyManager;
use callcore::db::DatabaseManager;
use callcore::llm::{LlmClient, LlmExtractionOrchestrator};
use callcore::notifications::NotificationDispatcher;
use callcore::processor::QueueProcessor;
use callcore::provider::VoiceProviderClient;
use callcore::queue::CallQueue;
use callcore::schedule_cache::CampaignScheduleCache;
use callcore::triggers::TriggerEvaluator;
use callcore::webhook::{CompletionPayload, CompletionStatus, TranscriptSegmentPayload, WebhookIngestion};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Every scenario here wires the same collaborator set; only the LLM
/// base URL and `max_retries` vary per scenario, so construction is
/// factored out rather than repeated three times.
async fn build_webhook(db: Arc<DatabaseManager>, llm_base_url: &str, llm_max_retries: u32) -> WebhookIngestion {
    let concurrency = Arc::new(ConcurrencyManager::new(db.clone(), 10, 5));
    let queue = Arc::new(CallQueue::new(db.clone(), 100, 0, 10));
    let schedule_cache = Arc::new(CampaignScheduleCache::new(db.clone(), Arc::new(SystemClock), Duration::from_secs(600)));
    let provider = Arc::new(VoiceProviderClient::new("https://voice-provider.invalid", Duration::from_secs(5)).expect("provider"));
    let processor = Arc::new(QueueProcessor::new(
        db.clone(),
        concurrency.clone(),
        queue.clone(),
        schedule_cache,
        provider,
        "http://localhost:0".to_string(),
        Duration::from_secs(5),
    ));

    let llm_client = LlmClient::new(llm_base_url.to_string(), String::new(), Duration::from_secs(5), llm_max_retries)
        .expect("llm client");
    let llm = Arc::new(LlmExtractionOrchestrator::new(
        db.clone(),
        llm_client,
        "default-individual".to_string(),
        "default-complete".to_string(),
    ));

    // Port 1 is never listening in a test sandbox, so a send attempt
    // fails fast with connection-refused instead of hanging for the
    // full SMTP timeout.
    let notifications = Arc::new(
        NotificationDispatcher::new(db.clone(), "127.0.0.1", 1, "", "", "no-reply@example.invalid", Duration::from_secs(2))
            .expect("notification dispatcher"),
    );

    let billing = Arc::new(BillingHook::new(db.clone()));
    let triggers = Arc::new(TriggerEvaluator::new(db.clone(), queue.clone()));

    WebhookIngestion::new(
        db.clone(),
        concurrency,
        billing,
        llm,
        notifications,
        processor,
        triggers,
        String::new(),
    )
}

fn successful_extraction_body() -> serde_json::Value {
    serde_json::json!({
        "intent_score": 80.0,
        "urgency_score": 70.0,
        "budget_score": 60.0,
        "fit_score": 90.0,
        "engagement_score": 75.0,
        "total_score": 75.0,
        "lead_status_tag": "Hot",
        "reasoning": { "summary": "asked about pricing" },
    })
}

async fn lead_analytics_counts(db: &DatabaseManager, tenant: Uuid, phone: &str) -> (i64, i64) {
    let individual: i64 = sqlx::query("SELECT COUNT(*) AS n FROM lead_analytics WHERE tenant_id = $1 AND phone = $2 AND analysis_type = 'individual'")
        .bind(tenant)
        .bind(phone)
        .fetch_one(db.pool())
        .await
        .expect("count individual")
        .try_get("n")
        .expect("n");
    let complete: i64 = sqlx::query("SELECT COUNT(*) AS n FROM lead_analytics WHERE tenant_id = $1 AND phone = $2 AND analysis_type = 'complete'")
        .bind(tenant)
        .bind(phone)
        .fetch_one(db.pool())
        .await
        .expect("count complete")
        .try_get("n")
        .expect("n");
    (individual, complete)
}

async fn credit_transaction_count(db: &DatabaseManager, tenant: Uuid) -> i64 {
    sqlx::query("SELECT COUNT(*) AS n FROM credit_transactions WHERE tenant_id = $1")
        .bind(tenant)
        .fetch_one(db.pool())
        .await
        .expect("count transactions")
        .try_get("n")
        .expect("n")
}

#[tokio::test]
#[serial_test::serial]
async fn s4_idempotent_completion() {
    let db = Arc::new(require_test_db!());
    let tenant = common::insert_tenant(&db, 1_000, None).await;
    let agent = common::insert_agent(&db, tenant).await;
    let phone = "+15552220001";
    let execution_id = format!("exec-{}", Uuid::new_v4());

    db.insert_call(Uuid::new_v4(), tenant, agent, None, &execution_id, callcore::domain::CallDirection::Outbound, phone)
        .await
        .expect("insert call");

    let llm_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(successful_extraction_body()))
        .mount(&llm_server)
        .await;

    let webhook = build_webhook(db.clone(), &llm_server.uri(), 3).await;

    let payload = CompletionPayload {
        execution_id: execution_id.clone(),
        agent_id: agent,
        phone_number: phone.to_string(),
        duration_seconds: 125,
        transcript: vec![TranscriptSegmentPayload {
            role: "caller".to_string(),
            message: "I'd like to know more about pricing.".to_string(),
            timestamp: Utc::now(),
        }],
        analysis: None,
        metadata: None,
        hangup_by: None,
        hangup_reason: None,
        hangup_provider_code: None,
        status: CompletionStatus::Done,
        timestamp: Utc::now(),
    };

    let first_ack = webhook.handle_completion(payload.clone()).await.expect("first delivery");
    assert!(!first_ack.duplicate);

    let call = db.call_by_execution_id(&execution_id).await.expect("lookup").expect("call exists");
    assert_eq!(call.lifecycle_status, callcore::domain::LifecycleStatus::Completed);
    assert_eq!(call.duration_minutes, Some(3), "ceil(125/60) == 3");
    assert_eq!(call.credits_used, Some(3));

    let tenant_row = db.tenant_by_id(tenant).await.expect("lookup").expect("tenant exists");
    assert_eq!(tenant_row.credits, 997);

    let (individual, complete) = lead_analytics_counts(&db, tenant, phone).await;
    assert_eq!(individual, 1);
    assert_eq!(complete, 1);
    assert_eq!(credit_transaction_count(&db, tenant).await, 1);

    let second_ack = webhook.handle_completion(payload).await.expect("replayed delivery");
    assert!(second_ack.duplicate, "replay of a terminal call must be a no-op");

    let call_after = db.call_by_execution_id(&execution_id).await.expect("lookup").expect("call exists");
    assert_eq!(call_after.credits_used, Some(3), "no double billing on replay");

    let (individual_after, complete_after) = lead_analytics_counts(&db, tenant, phone).await;
    assert_eq!(individual_after, 1, "no second individual analysis row");
    assert_eq!(complete_after, 1, "complete row still exactly one");
    assert_eq!(credit_transaction_count(&db, tenant).await, 1, "no additional ledger entries");
}

#[tokio::test]
#[serial_test::serial]
async fn s5_llm_outage_mid_completion() {
    let db = Arc::new(require_test_db!());
    let tenant = common::insert_tenant(&db, 1_000, None).await;
    let agent = common::insert_agent(&db, tenant).await;
    let phone = "+15552220002";
    let execution_id = format!("exec-{}", Uuid::new_v4());

    db.insert_call(Uuid::new_v4(), tenant, agent, None, &execution_id, callcore::domain::CallDirection::Outbound, phone)
        .await
        .expect("insert call");

    let llm_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&llm_server)
        .await;

    // max_retries = 1 keeps the exponential backoff sleep to a single
    // second instead of the configured default's three retries.
    let webhook = build_webhook(db.clone(), &llm_server.uri(), 1).await;

    let payload = CompletionPayload {
        execution_id: execution_id.clone(),
        agent_id: agent,
        phone_number: phone.to_string(),
        duration_seconds: 125,
        transcript: vec![TranscriptSegmentPayload {
            role: "caller".to_string(),
            message: "Still interested, can you call back later?".to_string(),
            timestamp: Utc::now(),
        }],
        analysis: None,
        metadata: None,
        hangup_by: None,
        hangup_reason: None,
        hangup_provider_code: None,
        status: CompletionStatus::Done,
        timestamp: Utc::now(),
    };

    let ack = webhook.handle_completion(payload.clone()).await.expect("completion survives llm outage");
    assert!(!ack.duplicate);

    let call = db.call_by_execution_id(&execution_id).await.expect("lookup").expect("call exists");
    assert_eq!(call.lifecycle_status, callcore::domain::LifecycleStatus::Completed);
    assert_eq!(call.duration_minutes, Some(3));
    assert_eq!(call.credits_used, Some(3));

    let transcript = db.transcript_for_call(call.id).await.expect("transcript lookup");
    assert!(transcript.is_some(), "transcript must persist even if analytics fail");

    let (individual, complete) = lead_analytics_counts(&db, tenant, phone).await;
    assert_eq!(individual, 0, "no analytics row when the llm never responds successfully");
    assert_eq!(complete, 0);
    assert_eq!(credit_transaction_count(&db, tenant).await, 1);

    let replay_ack = webhook.handle_completion(payload).await.expect("replay");
    assert!(replay_ack.duplicate);
    assert_eq!(credit_transaction_count(&db, tenant).await, 1, "no duplicate billing on replay");
}

#[tokio::test]
#[serial_test::serial]
async fn s6_notification_preference_disabled() {
    let db = Arc::new(require_test_db!());
    let tenant = common::insert_tenant(&db, 20, None).await;
    let agent = common::insert_agent(&db, tenant).await;
    let phone = "+15552220003";
    let execution_id = format!("exec-{}", Uuid::new_v4());

    db.update_preferences(tenant, Some(false), None, None, None, None)
        .await
        .expect("disable low credit alerts");

    db.insert_call(Uuid::new_v4(), tenant, agent, None, &execution_id, callcore::domain::CallDirection::Outbound, phone)
        .await
        .expect("insert call");

    let llm_server = MockServer::start().await;
    let webhook = build_webhook(db.clone(), &llm_server.uri(), 1).await;

    // 480 seconds == exactly 8 billed minutes: 20 - 8 == 12, crossing
    // the credit_low_15 threshold (<= 15).
    let payload = CompletionPayload {
        execution_id: execution_id.clone(),
        agent_id: agent,
        phone_number: phone.to_string(),
        duration_seconds: 480,
        transcript: vec![],
        analysis: None,
        metadata: None,
        hangup_by: None,
        hangup_reason: None,
        hangup_provider_code: None,
        status: CompletionStatus::Done,
        timestamp: Utc::now(),
    };

    let ack = webhook.handle_completion(payload).await.expect("completion");
    assert!(!ack.duplicate);

    let tenant_row = db.tenant_by_id(tenant).await.expect("lookup").expect("tenant exists");
    assert_eq!(tenant_row.credits, 12);

    let row = sqlx::query(
        "SELECT notification_type, status, error FROM notifications WHERE tenant_id = $1 ORDER BY idempotency_key",
    )
    .bind(tenant)
    .fetch_one(db.pool())
    .await
    .expect("notification row");

    let notification_type: String = row.try_get("notification_type").expect("notification_type");
    let status: String = row.try_get("status").expect("status");
    let error: Option<String> = row.try_get("error").expect("error");

    assert_eq!(notification_type, "credit_low_15");
    assert_eq!(status, "skipped");
    assert_eq!(error.as_deref(), Some("User preference disabled"));
}
