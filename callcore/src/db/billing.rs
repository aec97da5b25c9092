//! Persistence for `tenants` and `credit_transactions` (spec.md §4.9, §6.4).

use sqlx::Row;
use uuid::Uuid;

use crate::domain::{CallId, CreditTransaction, CreditTransactionKind, Tenant, TenantId};
use crate::error::Result;

use super::DatabaseManager;

impl DatabaseManager {
    pub async fn tenant_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>> {
        let row = sqlx::query("SELECT id, credits, concurrent_calls_limit FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| {
            Ok(Tenant {
                id: r.try_get("id")?,
                credits: r.try_get("credits")?,
                concurrent_calls_limit: r.try_get("concurrent_calls_limit")?,
            })
        })
        .transpose()
    }

    /// spec.md §4.9: `update tenants set credits = credits - :billed
    /// where id = :t and credits >= 0`, paired with a `CreditTransaction`
    /// insert in the same transaction — "part of the same transaction as
    /// the Call update where the storage layer supports it". Returns the
    /// post-decrement balance.
    ///
    /// A decrement may push credits negative (spec.md: "Credits may go
    /// negative if the decrement is large") — the `credits >= 0` guard
    /// only prevents decrementing an *already-negative* balance further
    /// via this path, it is not a floor.
    pub async fn record_usage(
        &self,
        tenant_id: TenantId,
        call_id: CallId,
        billed_minutes: i64,
    ) -> Result<i64> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query(
            "UPDATE tenants SET credits = credits - $1
             WHERE id = $2 AND credits >= 0
             RETURNING credits",
        )
        .bind(billed_minutes)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let balance_after: i64 = match row {
            Some(row) => {
                let balance_after: i64 = row.try_get("credits")?;

                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO credit_transactions
                        (id, tenant_id, kind, amount, balance_after, call_id, created_at)
                     VALUES ($1, $2, 'usage', $3, $4, $5, now())",
                )
                .bind(id)
                .bind(tenant_id)
                .bind(-billed_minutes)
                .bind(balance_after)
                .bind(call_id)
                .execute(&mut *tx)
                .await?;

                balance_after
            }
            None => {
                // The `credits >= 0` guard blocked the decrement: this
                // tenant's balance is already negative. No ledger row is
                // written since no change occurred (§8 invariant 7 would
                // otherwise be violated by a phantom delta).
                let row = sqlx::query("SELECT credits FROM tenants WHERE id = $1")
                    .bind(tenant_id)
                    .fetch_one(&mut *tx)
                    .await?;
                row.try_get("credits")?
            }
        };

        tx.commit().await?;
        Ok(balance_after)
    }

    /// §B.5 supplement: adding credits (e.g. from a billing webhook or
    /// operator action) follows the same ledger discipline as usage.
    pub async fn add_credits(
        &self,
        tenant_id: TenantId,
        amount: i64,
        kind: CreditTransactionKind,
    ) -> Result<i64> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query("UPDATE tenants SET credits = credits + $1 WHERE id = $2 RETURNING credits")
            .bind(amount)
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
        let balance_after: i64 = row.try_get("credits")?;

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO credit_transactions
                (id, tenant_id, kind, amount, balance_after, call_id, created_at)
             VALUES ($1, $2, $3, $4, $5, NULL, now())",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(balance_after)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(balance_after)
    }

    /// §B.4 supplement: a read path over the append-only ledger, to let
    /// operators audit §8 invariant 7 (sum of transactions equals the
    /// observed credit delta) without touching `tenants` directly.
    pub async fn credit_transactions_for(
        &self,
        tenant_id: TenantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, kind, amount, balance_after, call_id, created_at
             FROM credit_transactions WHERE tenant_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|r| {
                let kind_raw: String = r.try_get("kind")?;
                let kind = match kind_raw.as_str() {
                    "usage" => CreditTransactionKind::Usage,
                    "credits_added" => CreditTransactionKind::CreditsAdded,
                    "adjustment" => CreditTransactionKind::Adjustment,
                    other => {
                        return Err(crate::error::CallCoreError::internal(format!(
                            "unknown credit transaction kind in storage: {other}"
                        )))
                    }
                };
                Ok(CreditTransaction {
                    id: r.try_get("id")?,
                    tenant_id: r.try_get("tenant_id")?,
                    kind,
                    amount: r.try_get("amount")?,
                    balance_after: r.try_get("balance_after")?,
                    call_id: r.try_get("call_id")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }
}
