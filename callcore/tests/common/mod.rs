//! Shared fixtures for the cross-module scenario tests (spec.md §8,
//! scenarios S1-S6). These tests go straight at Postgres rather than
//! mocking the storage layer, so they only run when pointed at a real
//! (throwaway) database.
//!
//! Every test that uses [`test_db`] is `#[serial_test::serial]`: several
//! of the invariants under test are system-wide counts (`active_slots`
//! has no per-test partition), so two scenarios racing the same
//! database would shadow each other's slot counts.

use callcore::config::DatabaseConfig;
use callcore::db::DatabaseManager;
use callcore::domain::{AgentId, CallId, ContactId, TenantId};
use uuid::Uuid;

/// Connects to `CALLCORE_TEST_DATABASE_URL` and runs migrations.
/// Returns `None` (rather than panicking) when the variable is unset so
/// these tests degrade to a no-op skip in environments with no
/// Postgres available, instead of failing the whole suite.
pub async fn test_db() -> Option<DatabaseManager> {
    let url = std::env::var("CALLCORE_TEST_DATABASE_URL").ok()?;
    let config = DatabaseConfig {
        url,
        max_connections: 5,
    };
    Some(
        DatabaseManager::connect(&config)
            .await
            .expect("connect to test database"),
    )
}

/// Skips the calling test (returns early) when no test database is
/// configured, logging why so a run in CI with the variable unset reads
/// as "skipped", not "silently did nothing".
#[macro_export]
macro_rules! require_test_db {
    () => {
        match $crate::common::test_db().await {
            Some(db) => db,
            None => {
                eprintln!(
                    "skipping: set CALLCORE_TEST_DATABASE_URL to a throwaway Postgres instance to run this test"
                );
                return;
            }
        }
    };
}

pub async fn insert_tenant(db: &DatabaseManager, credits: i64, concurrent_calls_limit: Option<i64>) -> TenantId {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO tenants (id, email, credits, concurrent_calls_limit) VALUES ($1, NULL, $2, $3)")
        .bind(id)
        .bind(credits)
        .bind(concurrent_calls_limit)
        .execute(db.pool())
        .await
        .expect("insert tenant");
    id
}

pub async fn insert_agent(db: &DatabaseManager, tenant_id: TenantId) -> AgentId {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO agents (id, tenant_id, provider_agent_id, name) VALUES ($1, $2, 'prov-agent', 'Test Agent')",
    )
    .bind(id)
    .bind(tenant_id)
    .execute(db.pool())
    .await
    .expect("insert agent");
    id
}

pub async fn insert_contact(db: &DatabaseManager, tenant_id: TenantId, phone: &str, name: Option<&str>) -> ContactId {
    db.create_contact(tenant_id, phone, name, None, None, &[])
        .await
        .expect("insert contact")
        .id
}

/// `active_slots.call_id` is a foreign key into `calls`, so any test
/// exercising `ConcurrencyManager` directly (without going through
/// `QueueProcessor::dispatch`) needs a real call row first.
pub async fn insert_placeholder_call(
    db: &DatabaseManager,
    tenant_id: TenantId,
    agent_id: AgentId,
    phone: &str,
) -> CallId {
    let id = Uuid::new_v4();
    db.insert_call(
        id,
        tenant_id,
        agent_id,
        None,
        &id.to_string(),
        callcore::domain::CallDirection::Outbound,
        phone,
    )
    .await
    .expect("insert placeholder call");
    id
}
