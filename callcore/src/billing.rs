//! # Billing Hook (spec.md §4.9)
//!
//! Decrements tenant credits and writes the matching ledger row. Kept
//! as its own small component (rather than inlined into the webhook
//! handler) because §9 calls out "billing errors are logged but do not
//! undo extraction or slot release" — a distinct failure domain
//! deserves a distinct seam.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::DatabaseManager;
use crate::domain::{CallId, CreditTransactionKind, TenantId};
use crate::error::Result;

#[derive(Clone)]
pub struct BillingHook {
    db: Arc<DatabaseManager>,
}

impl BillingHook {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// spec.md §4.9: decrement credits by `billed_minutes`, insert a
    /// `usage` CreditTransaction, return the post-decrement balance for
    /// the caller's low-credit notification check (§4.8).
    ///
    /// "No retry" (§4.9): this runs once per completion webhook, and
    /// §4.6's completion-idempotency (the unique `execution_id`
    /// constraint) is what prevents a retried webhook from double
    /// billing, not a retry guard in here.
    pub async fn record_call_usage(&self, tenant_id: TenantId, call_id: CallId, billed_minutes: i64) -> Result<i64> {
        let balance = self.db.record_usage(tenant_id, call_id, billed_minutes).await?;
        if balance < 0 {
            warn!(%tenant_id, %call_id, balance, "tenant balance went negative after usage decrement");
        } else {
            info!(%tenant_id, %call_id, billed_minutes, balance, "recorded call usage");
        }
        Ok(balance)
    }

    pub async fn add_credits(&self, tenant_id: TenantId, amount: i64) -> Result<i64> {
        self.db.add_credits(tenant_id, amount, CreditTransactionKind::CreditsAdded).await
    }

    pub async fn adjust(&self, tenant_id: TenantId, amount: i64) -> Result<i64> {
        self.db.add_credits(tenant_id, amount, CreditTransactionKind::Adjustment).await
    }

    pub async fn current_balance(&self, tenant_id: TenantId) -> Result<Option<i64>> {
        Ok(self.db.tenant_by_id(tenant_id).await?.map(|t| t.credits))
    }

    /// §B.4 supplement: paginated ledger read, backing an operator
    /// audit endpoint over §8 invariant 7.
    pub async fn transaction_history(
        &self,
        tenant_id: TenantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<crate::domain::CreditTransaction>> {
        self.db.credit_transactions_for(tenant_id, limit, offset).await
    }
}
