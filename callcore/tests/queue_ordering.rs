//! Cross-module scenarios S1 ("direct call when full") and S2 ("direct
//! overtakes campaign") from spec.md §8. These go through the real
//! `CallQueue` + `ConcurrencyManager` + `QueueProcessor` trio against a
//! live Postgres, with the voice provider mocked via `wiremock`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use callcore::clock::SystemClock;
use callcore::concurrency::ConcurrencyManager;
use callcore::domain::{CampaignStatus, QueueItemKind, QueueItemStatus};
use callcore::processor::{ProcessOutcome, QueueProcessor};
use callcore::provider::VoiceProviderClient;
use callcore::queue::CallQueue;
use callcore::schedule_cache::CampaignScheduleCache;
use chrono::{NaiveTime, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct UniqueExecutionIdResponder;

impl Respond for UniqueExecutionIdResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let execution_id = format!("exec-{}", uuid::Uuid::new_v4());
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "execution_id": execution_id }))
    }
}

#[tokio::test]
#[serial_test::serial]
async fn s1_direct_call_when_full_is_queued_not_dispatched() {
    let db = Arc::new(require_test_db!());

    let tenant = common::insert_tenant(&db, 1_000, Some(2)).await;
    let agent = common::insert_agent(&db, tenant).await;

    // "A has 2 ActiveSlots" — occupy both of the tenant's 2 slots with
    // real in-flight calls before the new direct request arrives.
    let concurrency = Arc::new(ConcurrencyManager::new(db.clone(), 10, 5));
    for _ in 0..2 {
        let call_id = common::insert_placeholder_call(&db, tenant, agent, "+15550000000").await;
        let outcome = concurrency.reserve_direct_slot(tenant, call_id, Some(2)).await.expect("reserve");
        assert_eq!(outcome, callcore::concurrency::ReservationResult::Reserved);
    }

    let queue = Arc::new(CallQueue::new(db.clone(), 100, 0, 10));
    let item = queue
        .enqueue_direct(tenant, agent, None, "+15551234567")
        .await
        .expect("enqueue direct");
    assert_eq!(item.kind, QueueItemKind::Direct);
    assert_eq!(item.priority, 100);
    assert_eq!(item.status, QueueItemStatus::Queued);
    assert_eq!(queue.position_of(item.id).await.expect("position"), Some(1));

    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calls"))
        .respond_with(UniqueExecutionIdResponder)
        .mount(&mock_server)
        .await;

    let schedule_cache = Arc::new(CampaignScheduleCache::new(db.clone(), Arc::new(SystemClock), Duration::from_secs(600)));
    let provider = Arc::new(VoiceProviderClient::new(mock_server.uri(), Duration::from_secs(5)).expect("provider client"));
    let processor = QueueProcessor::new(
        db.clone(),
        concurrency.clone(),
        queue.clone(),
        schedule_cache,
        provider,
        "http://localhost:0".to_string(),
        Duration::from_secs(5),
    );

    let outcome = processor.process_immediate(Some(tenant)).await.expect("process pass");
    assert_eq!(outcome, ProcessOutcome::Processed { dispatched: 0 });

    let refetched = queue.item_by_id(item.id).await.expect("item lookup").expect("item exists");
    assert_eq!(refetched.status, QueueItemStatus::Queued, "tenant is full, item must stay queued");

    assert!(
        mock_server.received_requests().await.expect("requests").is_empty(),
        "tenant at capacity must never reach the voice provider"
    );
}

#[tokio::test]
#[serial_test::serial]
async fn s2_direct_overtakes_campaign() {
    let db = Arc::new(require_test_db!());

    // Tenant cap of 3 so exactly "direct + two campaign items" dispatch
    // and the third campaign item is left behind, per §8 S2's expected
    // "positions 5,6 then dispatched up to T(A)".
    let tenant = common::insert_tenant(&db, 1_000, Some(3)).await;
    let agent = common::insert_agent(&db, tenant).await;

    let campaign = db
        .create_campaign(
            tenant,
            agent,
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            "UTC",
            Utc::now(),
            3,
        )
        .await
        .expect("create campaign");
    db.set_campaign_status(campaign.id, CampaignStatus::Active)
        .await
        .expect("activate campaign");

    let queue = Arc::new(CallQueue::new(db.clone(), 100, 0, 10));

    let mut campaign_items = Vec::new();
    for n in 0..3 {
        let contact = common::insert_contact(&db, tenant, &format!("+1555000{n:04}"), None).await;
        let item = queue
            .enqueue_campaign(tenant, campaign.id, agent, contact, &format!("+1555000{n:04}"), Utc::now())
            .await
            .expect("enqueue campaign item");
        assert_eq!(item.priority, 0);
        campaign_items.push(item);
    }

    // Enqueued last but must dispatch first.
    let direct_item = queue
        .enqueue_direct(tenant, agent, None, "+15559998888")
        .await
        .expect("enqueue direct");

    let concurrency = Arc::new(ConcurrencyManager::new(db.clone(), 10, 5));
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calls"))
        .respond_with(UniqueExecutionIdResponder)
        .mount(&mock_server)
        .await;

    let schedule_cache = Arc::new(CampaignScheduleCache::new(db.clone(), Arc::new(SystemClock), Duration::from_secs(600)));
    let provider = Arc::new(VoiceProviderClient::new(mock_server.uri(), Duration::from_secs(5)).expect("provider client"));
    let processor = QueueProcessor::new(
        db.clone(),
        concurrency,
        queue.clone(),
        schedule_cache,
        provider,
        "http://localhost:0".to_string(),
        Duration::from_secs(5),
    );

    let outcome = processor.process_immediate(Some(tenant)).await.expect("process pass");
    assert_eq!(outcome, ProcessOutcome::Processed { dispatched: 3 });

    let direct_after = queue.item_by_id(direct_item.id).await.expect("lookup").expect("exists");
    assert_eq!(direct_after.status, QueueItemStatus::Processing, "direct item must dispatch despite arriving last");

    let first_campaign = queue.item_by_id(campaign_items[0].id).await.expect("lookup").expect("exists");
    let second_campaign = queue.item_by_id(campaign_items[1].id).await.expect("lookup").expect("exists");
    let third_campaign = queue.item_by_id(campaign_items[2].id).await.expect("lookup").expect("exists");

    assert_eq!(first_campaign.status, QueueItemStatus::Processing);
    assert_eq!(second_campaign.status, QueueItemStatus::Processing);
    assert_eq!(third_campaign.status, QueueItemStatus::Queued, "no priority inversion: cap reached before this one");
}
