//! Persistence for `ActiveSlot` rows — the atomic insert-then-count
//! pattern from spec.md §4.1, grounded on the teacher's
//! `DatabaseManager::reserve_agent` (insert/update inside a transaction,
//! commit only if the invariant holds, otherwise roll back).

use sqlx::Row;

use crate::domain::{ActiveSlotKind, CallId, TenantId};
use crate::error::Result;

use super::DatabaseManager;

impl DatabaseManager {
    /// Inserts a candidate `ActiveSlot` row, counts system-wide and
    /// per-tenant occupancy inside the same transaction, and commits
    /// only if both caps hold — spec.md §4.1 steps 1-4.
    ///
    /// Returns `(system_count, tenant_count)` *after* the insert,
    /// whether or not the caller ultimately commits — the caller (the
    /// [`crate::concurrency::ConcurrencyManager`]) decides pass/fail and
    /// this function performs the matching commit/rollback.
    pub async fn try_reserve_slot(
        &self,
        tenant_id: TenantId,
        call_id: CallId,
        kind: ActiveSlotKind,
        global_cap: i64,
        tenant_cap: i64,
    ) -> Result<ReserveOutcome> {
        let mut tx = self.pool().begin().await?;

        let kind_str = match kind {
            ActiveSlotKind::Direct => "direct",
            ActiveSlotKind::Campaign => "campaign",
        };

        // Idempotency key for the slot itself is call_id: a duplicate
        // reserve for the same call is a programmer error, not a race,
        // so a unique-constraint violation here is allowed to bubble up
        // as a genuine `sqlx::Error`.
        sqlx::query(
            "INSERT INTO active_slots (call_id, tenant_id, kind, reserved_at)
             VALUES ($1, $2, $3, now())",
        )
        .bind(call_id)
        .bind(tenant_id)
        .bind(kind_str)
        .execute(&mut *tx)
        .await?;

        let sys_row = sqlx::query("SELECT COUNT(*) AS n FROM active_slots")
            .fetch_one(&mut *tx)
            .await?;
        let sys: i64 = sys_row.try_get("n")?;

        let own_row = sqlx::query("SELECT COUNT(*) AS n FROM active_slots WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
        let own: i64 = own_row.try_get("n")?;

        if sys > global_cap {
            tx.rollback().await?;
            return Ok(ReserveOutcome::Rejected {
                reason: RejectReason::System,
                system_count: sys,
                tenant_count: own,
            });
        }
        if own > tenant_cap {
            tx.rollback().await?;
            return Ok(ReserveOutcome::Rejected {
                reason: RejectReason::Tenant,
                system_count: sys,
                tenant_count: own,
            });
        }

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved {
            system_count: sys,
            tenant_count: own,
        })
    }

    /// Idempotent: deleting a row that doesn't exist is not an error
    /// (spec.md §4.1: `releaseSlot` — idempotent).
    pub async fn release_slot(&self, call_id: CallId) -> Result<()> {
        sqlx::query("DELETE FROM active_slots WHERE call_id = $1")
            .bind(call_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn count_system_slots(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM active_slots")
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn count_tenant_slots(&self, tenant_id: TenantId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM active_slots WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("n")?)
    }

    /// §8 invariant 3: for every non-terminal Call there is exactly one
    /// `ActiveSlot`. Used by reconciliation, not the hot path.
    pub async fn has_active_slot(&self, call_id: CallId) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM active_slots WHERE call_id = $1")
            .bind(call_id)
            .fetch_one(self.pool())
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { system_count: i64, tenant_count: i64 },
    Rejected { reason: RejectReason, system_count: i64, tenant_count: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    System,
    Tenant,
}
