//! # Concurrency Manager (spec.md §4.1)
//!
//! Enforces the global cap `G` and the per-tenant cap `T(tenant)` on
//! simultaneously active calls via atomic slot reservation. Reservation
//! failure is flow control, never an error — callers get a tagged
//! [`ReservationResult`], matching the teacher's redesign note in §9
//! ("replace exception-driven control flow... with tagged outcomes").

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::concurrency::{RejectReason, ReserveOutcome};
use crate::db::DatabaseManager;
use crate::domain::{ActiveSlotKind, CallId, TenantId};
use crate::error::Result;

#[derive(Clone)]
pub struct ConcurrencyManager {
    db: Arc<DatabaseManager>,
    global_cap: i64,
    default_tenant_cap: i64,
}

/// `{ok: true} | {ok: false, shouldQueue: bool, reason}` from spec.md
/// §4.1, spelled out as a Rust enum instead of an ad-hoc object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationResult {
    Reserved,
    /// A failed direct reservation always carries `should_queue = true`
    /// (spec.md §4.1): the caller must enqueue, never reject outright.
    Rejected { should_queue: bool, reason: QueueReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
    SystemFull,
    TenantFull,
}

impl ConcurrencyManager {
    pub fn new(db: Arc<DatabaseManager>, global_cap: i64, default_tenant_cap: i64) -> Self {
        Self {
            db,
            global_cap,
            default_tenant_cap,
        }
    }

    /// spec.md §4.1: `reserveDirectSlot`. Same algorithm as
    /// [`Self::reserve_campaign_slot`]; kept as a distinct method only so
    /// call sites and log lines stay legible about which path a
    /// rejection came from.
    pub async fn reserve_direct_slot(
        &self,
        tenant_id: TenantId,
        call_id: CallId,
        tenant_cap: Option<i64>,
    ) -> Result<ReservationResult> {
        self.reserve(tenant_id, call_id, ActiveSlotKind::Direct, tenant_cap)
            .await
    }

    /// spec.md §4.1: `reserveCampaignSlot`.
    pub async fn reserve_campaign_slot(
        &self,
        tenant_id: TenantId,
        call_id: CallId,
        tenant_cap: Option<i64>,
    ) -> Result<ReservationResult> {
        self.reserve(tenant_id, call_id, ActiveSlotKind::Campaign, tenant_cap)
            .await
    }

    async fn reserve(
        &self,
        tenant_id: TenantId,
        call_id: CallId,
        kind: ActiveSlotKind,
        tenant_cap: Option<i64>,
    ) -> Result<ReservationResult> {
        let tenant_cap = tenant_cap.unwrap_or(self.default_tenant_cap);
        let outcome = self
            .db
            .try_reserve_slot(tenant_id, call_id, kind, self.global_cap, tenant_cap)
            .await?;

        Ok(match outcome {
            ReserveOutcome::Reserved {
                system_count,
                tenant_count,
            } => {
                debug!(
                    %tenant_id, %call_id, ?kind, system_count, tenant_count,
                    "slot reserved"
                );
                ReservationResult::Reserved
            }
            ReserveOutcome::Rejected { reason, .. } => {
                let reason = match reason {
                    RejectReason::System => QueueReason::SystemFull,
                    RejectReason::Tenant => QueueReason::TenantFull,
                };
                warn!(%tenant_id, %call_id, ?kind, ?reason, "slot reservation rejected");
                ReservationResult::Rejected {
                    should_queue: true,
                    reason,
                }
            }
        })
    }

    /// Idempotent (spec.md §4.1).
    pub async fn release_slot(&self, call_id: CallId) -> Result<()> {
        info!(%call_id, "releasing active slot");
        self.db.release_slot(call_id).await
    }

    pub async fn count_system(&self) -> Result<i64> {
        self.db.count_system_slots().await
    }

    pub async fn count_tenant(&self, tenant_id: TenantId) -> Result<i64> {
        self.db.count_tenant_slots(tenant_id).await
    }

    pub fn global_cap(&self) -> i64 {
        self.global_cap
    }

    pub fn default_tenant_cap(&self) -> i64 {
        self.default_tenant_cap
    }
}
