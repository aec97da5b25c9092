//! Domain entities (§3: Tenant, Agent, PhoneNumber, Contact, Call,
//! QueueItem, ActiveSlot, Campaign, Transcript, LeadAnalytics,
//! Notification, NotificationPreference, AutoEngagementFlow).
//!
//! These are plain data types with no storage logic attached — the `db`
//! module owns persistence, these just give it (and everything else) a
//! shared vocabulary.

pub mod call;
pub mod campaign;
pub mod contact;
pub mod lead_analytics;
pub mod notification;
pub mod queue_item;
pub mod tenant;
pub mod trigger;

pub use call::{Call, CallDirection, HangupBy, LifecycleStatus};
pub use campaign::{Campaign, CampaignStatus};
pub use contact::Contact;
pub use lead_analytics::{AnalysisType, LeadAnalytics, StatusTag};
pub use notification::{Notification, NotificationPreference, NotificationStatus, NotificationType};
pub use queue_item::{QueueItemKind, QueueItemStatus, QueueItemRecord};
pub use tenant::{Agent, PhoneNumber, Tenant};
pub use trigger::{AutoEngagementFlow, TriggerAction, TriggerCondition, TriggerContinuation, TriggerOperator};

use uuid::Uuid;

/// Newtype wrappers would be more ceremony than this crate needs —
/// tenant/call/campaign ids are all plain UUIDs, distinguished by field
/// name and by the composite-FK discipline described in spec.md §3.
pub type TenantId = Uuid;
pub type AgentId = Uuid;
pub type PhoneNumberId = Uuid;
pub type ContactId = Uuid;
pub type CallId = Uuid;
pub type QueueItemId = Uuid;
pub type CampaignId = Uuid;
pub type NotificationId = Uuid;
