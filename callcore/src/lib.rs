//! # Call Orchestration Core
//!
//! The shared engine behind a multi-tenant AI-calling platform: a
//! concurrency manager that caps simultaneous calls system-wide and per
//! tenant, a priority call queue, a processor that drains it in
//! round-robin passes, a campaign schedule cache that lets the
//! processor skip the database outside a campaign's call window, a
//! webhook ingestion pipeline that turns provider callbacks into
//! billing and analytics, a notification dispatcher, and a trigger
//! evaluator that auto-enqueues calls off contact creation.
//!
//! ## Module Organization
//!
//! - [`config`]: layered configuration (TOML + `CALLCORE_*` env)
//! - [`domain`]: plain data types shared by every module below
//! - [`db`]: the Postgres-backed storage layer
//! - [`clock`]: an injectable clock so time-dependent logic is testable
//! - [`error`]: the crate's error type
//! - [`concurrency`]: system-wide and per-tenant call-slot reservation
//! - [`queue`]: the priority call queue
//! - [`schedule_cache`]: the in-memory campaign-window cache
//! - [`processor`]: the round-robin queue-draining pass
//! - [`provider`]: the outbound voice-provider HTTP client
//! - [`llm`]: the call-transcript extraction client and orchestrator
//! - [`notifications`]: the idempotent email dispatcher
//! - [`billing`]: credit-usage recording
//! - [`triggers`]: contact-creation auto-engagement evaluation
//! - [`webhook`]: the ingestion pipeline tying the above together
//!
//! ## Quick Start
//!
//! ```no_run
//! use callcore::{CallCore, CallCoreConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CallCoreConfig::load(None)?;
//! let core = CallCore::new(config).await?;
//! core.processor.process_smart().await?;
//! # Ok(())
//! # }
//! ```

pub mod billing;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod llm;
pub mod notifications;
pub mod processor;
pub mod provider;
pub mod queue;
pub mod schedule_cache;
pub mod triggers;
pub mod webhook;

use std::sync::Arc;

use tracing::info;

pub use config::CallCoreConfig;
pub use error::{CallCoreError, Result};

use billing::BillingHook;
use clock::{Clock, SystemClock};
use concurrency::ConcurrencyManager;
use db::DatabaseManager;
use llm::{LlmClient, LlmExtractionOrchestrator};
use notifications::NotificationDispatcher;
use processor::QueueProcessor;
use provider::VoiceProviderClient;
use queue::CallQueue;
use schedule_cache::CampaignScheduleCache;
use triggers::TriggerEvaluator;
use webhook::WebhookIngestion;

/// The fully wired application: one instance per process, constructed
/// once from a loaded [`CallCoreConfig`] and shared behind `Arc` with
/// every task and HTTP handler that needs it.
///
/// Mirrors the teacher's `CallCenterEngine::new` shape: every
/// collaborator is constructed here, in dependency order, from a
/// single config and a single shared database pool, and handed back as
/// one struct so callers don't have to know the wiring.
pub struct CallCore {
    pub config: CallCoreConfig,
    pub db: Arc<DatabaseManager>,
    pub concurrency: Arc<ConcurrencyManager>,
    pub queue: Arc<CallQueue>,
    pub schedule_cache: Arc<CampaignScheduleCache>,
    pub processor: Arc<QueueProcessor>,
    pub provider: Arc<VoiceProviderClient>,
    pub llm: Arc<LlmExtractionOrchestrator>,
    pub notifications: Arc<NotificationDispatcher>,
    pub billing: Arc<BillingHook>,
    pub triggers: Arc<TriggerEvaluator>,
    pub webhook: Arc<WebhookIngestion>,
}

impl CallCore {
    /// Connects to the database, runs pending migrations, and wires
    /// every subsystem from `config`. Returns an `Arc` because nearly
    /// every caller (HTTP handlers, the background processor loop)
    /// needs shared ownership.
    pub async fn new(config: CallCoreConfig) -> Result<Arc<Self>> {
        info!("connecting to database");
        let db = Arc::new(DatabaseManager::connect(&config.database).await?);

        let concurrency = Arc::new(ConcurrencyManager::new(
            db.clone(),
            config.concurrency.global_cap,
            config.concurrency.default_tenant_cap,
        ));

        let queue = Arc::new(CallQueue::new(
            db.clone(),
            config.queue.direct_priority,
            config.queue.campaign_priority,
            config.queue.named_contact_priority_boost,
        ));

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let schedule_cache = Arc::new(CampaignScheduleCache::new(db.clone(), clock, config.schedule.ttl));

        let provider = Arc::new(VoiceProviderClient::new(
            config.provider.base_url.clone(),
            config.provider.timeout,
        )?);

        let processor = Arc::new(QueueProcessor::new(
            db.clone(),
            concurrency.clone(),
            queue.clone(),
            schedule_cache.clone(),
            provider.clone(),
            config.provider.base_url.clone(),
            config.general.processor_pass_budget,
        ));

        let llm_client = LlmClient::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            config.llm.timeout,
            config.llm.max_retries,
        )?;
        let llm = Arc::new(LlmExtractionOrchestrator::new(
            db.clone(),
            llm_client,
            config.llm.default_individual_prompt_id.clone(),
            config.llm.default_complete_prompt_id.clone(),
        ));

        let notifications = Arc::new(NotificationDispatcher::new(
            db.clone(),
            &config.notification.smtp_host,
            config.notification.smtp_port,
            &config.notification.smtp_username,
            &config.notification.smtp_password,
            &config.notification.from_address,
            config.notification.send_timeout,
        )?);

        let billing = Arc::new(BillingHook::new(db.clone()));
        let triggers = Arc::new(TriggerEvaluator::new(db.clone(), queue.clone()));

        let webhook = Arc::new(WebhookIngestion::new(
            db.clone(),
            concurrency.clone(),
            billing.clone(),
            llm.clone(),
            notifications.clone(),
            processor.clone(),
            triggers.clone(),
            config.provider.webhook_shared_secret.clone(),
        ));

        info!("call orchestration core ready");
        Ok(Arc::new(Self {
            config,
            db,
            concurrency,
            queue,
            schedule_cache,
            processor,
            provider,
            llm,
            notifications,
            billing,
            triggers,
            webhook,
        }))
    }
}
