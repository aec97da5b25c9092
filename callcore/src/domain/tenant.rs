use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, PhoneNumberId, TenantId};

/// Identity bearing credits, a personal concurrency cap, and notification
/// preferences (spec.md §3). Created externally; every other entity
/// references it for isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub credits: i64,
    /// `T(tenant)` in §4.1. `None` means the processor falls back to
    /// `ConcurrencyConfig::default_tenant_cap`.
    pub concurrent_calls_limit: Option<i64>,
}

/// A configured AI persona bound to one Tenant (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    /// Opaque id on the voice provider's side.
    pub provider_agent_id: String,
    pub name: String,
    /// Per-tenant default prompt ids used by §4.7 when a call doesn't
    /// carry its own override.
    pub individual_prompt_id: Option<String>,
    pub complete_prompt_id: Option<String>,
}

/// An outbound caller-id resource, at most assigned to one Agent
/// (spec.md §3 — 1:1 partial).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub id: PhoneNumberId,
    pub tenant_id: TenantId,
    pub phone: String,
    pub assigned_to_agent_id: Option<AgentId>,
    pub is_active: bool,
}

/// One entry in a tenant's credit ledger (§4.9, §8 invariant 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub kind: CreditTransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub call_id: Option<super::CallId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditTransactionKind {
    Usage,
    CreditsAdded,
    Adjustment,
}

impl CreditTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::CreditsAdded => "credits_added",
            Self::Adjustment => "adjustment",
        }
    }
}
