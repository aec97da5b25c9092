use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CallId, ContactId, TenantId};

/// A (Tenant, phone) pair with display fields (spec.md §3). Unique per
/// `(tenant_id, phone)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub tenant_id: TenantId,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub tags: Vec<String>,

    /// §4.6 step 6: contact auto-create provenance.
    pub is_auto_created: bool,
    pub auto_creation_source: Option<String>,
    pub auto_created_from_call_id: Option<CallId>,

    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Used by §4.2's named-contact priority boost and by §4.10's "DNC
    /// tag aborts all flows" rule.
    pub fn has_display_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    pub fn has_dnc_tag(&self) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case("dnc"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            phone: "+15551234567".to_string(),
            name: None,
            email: None,
            company: None,
            tags: vec![],
            is_auto_created: false,
            auto_creation_source: None,
            auto_created_from_call_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn blank_name_does_not_count_as_named() {
        let mut c = contact();
        c.name = Some("   ".to_string());
        assert!(!c.has_display_name());
        c.name = Some("Dana".to_string());
        assert!(c.has_display_name());
    }

    #[test]
    fn dnc_tag_is_case_insensitive() {
        let mut c = contact();
        c.tags = vec!["VIP".to_string(), "Dnc".to_string()];
        assert!(c.has_dnc_tag());
    }
}
