//! A `Wait`-then-`Call` auto-engagement flow must not drop its trailing
//! action: `on_contact_created` should defer it as a
//! `TriggerContinuation`, and `TriggerEvaluator::resume_due` should
//! replay it once `resume_at` has passed (spec.md §4.10).

mod common;

use std::sync::Arc;

use callcore::queue::CallQueue;
use callcore::triggers::{ActionOutcome, TriggerEvaluator};
use chrono::{Duration, Utc};
use uuid::Uuid;

#[tokio::test]
#[serial_test::serial]
async fn wait_then_call_resumes_instead_of_dropping_the_call_action() {
    let db = Arc::new(require_test_db!());
    let tenant = common::insert_tenant(&db, 1_000, None).await;
    let agent = common::insert_agent(&db, tenant).await;
    let contact = common::insert_contact(&db, tenant, "+15554440000", Some("Jordan Lee")).await;

    let campaign = db
        .create_campaign(
            tenant,
            agent,
            chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            "UTC",
            Utc::now(),
            1,
        )
        .await
        .expect("create campaign");
    db.set_campaign_status(campaign.id, callcore::domain::CampaignStatus::Active)
        .await
        .expect("activate campaign");

    let resume_at = Utc::now() - Duration::seconds(1);
    let flow_id = Uuid::new_v4();
    let actions = serde_json::json!([
        { "kind": "wait", "until": resume_at },
        { "kind": "call", "agent_id": agent, "campaign_id": campaign.id },
    ]);
    sqlx::query(
        "INSERT INTO auto_engagement_flows (id, tenant_id, priority, enabled, business_hours_only, conditions, actions)
         VALUES ($1, $2, 0, true, false, '[]'::jsonb, $3)",
    )
    .bind(flow_id)
    .bind(tenant)
    .bind(&actions)
    .execute(db.pool())
    .await
    .expect("insert flow");

    let queue = Arc::new(CallQueue::new(db.clone(), 100, 0, 10));
    let evaluator = TriggerEvaluator::new(db.clone(), queue.clone());

    let outcomes = evaluator
        .on_contact_created(tenant, contact, "+15554440000", &serde_json::json!({}), false)
        .await
        .expect("on_contact_created");
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], ActionOutcome::Deferred { .. }), "the call action must not run yet");

    let queued_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM call_queue WHERE campaign_id = $1")
        .bind(campaign.id)
        .fetch_one(db.pool())
        .await
        .expect("count queue items");
    assert_eq!(queued_before, 0, "the call action must not have enqueued anything yet");

    let continuations_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trigger_continuations WHERE flow_id = $1")
        .bind(flow_id)
        .fetch_one(db.pool())
        .await
        .expect("count continuations");
    assert_eq!(continuations_before, 1, "the wait must persist a continuation instead of dropping the call action");

    let resumed = evaluator.resume_due(Utc::now()).await.expect("resume_due");
    assert_eq!(resumed, 1);

    let queued_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM call_queue WHERE campaign_id = $1")
        .bind(campaign.id)
        .fetch_one(db.pool())
        .await
        .expect("count queue items");
    assert_eq!(queued_after, 1, "resume_due must have executed the previously-deferred call action");

    let continuations_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trigger_continuations WHERE flow_id = $1")
        .bind(flow_id)
        .fetch_one(db.pool())
        .await
        .expect("count continuations");
    assert_eq!(continuations_after, 0, "the consumed continuation must be deleted");
}
