//! Call orchestration core configuration.
//!
//! The shape mirrors the teacher's `CallCenterConfig` section breakdown
//! (general / agents / queues / routing / monitoring / database), renamed
//! to this domain. Values are loaded with [`figment`] layering a TOML file
//! under environment variables prefixed `CALLCORE_`, so a serverless
//! deployment can override everything without a config file on disk.

use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CallCoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallCoreConfig {
    pub general: GeneralConfig,
    pub concurrency: ConcurrencyConfig,
    pub queue: QueueConfig,
    pub schedule: ScheduleConfig,
    pub provider: ProviderConfig,
    pub llm: LlmConfig,
    pub notification: NotificationConfig,
    pub database: DatabaseConfig,
}

/// System-wide knobs that don't belong to any one subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Wall-clock budget for one processor pass (§5: "≈ 60s").
    pub processor_pass_budget: Duration,
}

/// §4.1 Concurrency Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// System-wide cap `G`.
    pub global_cap: i64,
    /// Default per-tenant cap `T(tenant)`, used when a tenant has no
    /// explicit `concurrent_calls_limit` row.
    pub default_tenant_cap: i64,
}

/// §4.2 Call Queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub direct_priority: i32,
    pub campaign_priority: i32,
    /// Open Question §D.2: named-contact priority boost, resolved to +10.
    pub named_contact_priority_boost: i32,
}

/// §4.3 Campaign Schedule Cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub ttl: Duration,
}

/// §4.5 Voice Provider Client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub webhook_shared_secret: String,
    pub timeout: Duration,
}

/// §4.7 LLM Extraction Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub default_individual_prompt_id: String,
    pub default_complete_prompt_id: String,
}

/// §4.8 Notification Dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub send_timeout: Duration,
}

/// §6.4 storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for CallCoreConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                processor_pass_budget: Duration::from_secs(60),
            },
            concurrency: ConcurrencyConfig {
                global_cap: 100,
                default_tenant_cap: 5,
            },
            queue: QueueConfig {
                direct_priority: 100,
                campaign_priority: 0,
                named_contact_priority_boost: 10,
            },
            schedule: ScheduleConfig {
                ttl: Duration::from_secs(600),
            },
            provider: ProviderConfig {
                base_url: "https://voice-provider.invalid".to_string(),
                webhook_shared_secret: String::new(),
                timeout: Duration::from_secs(30),
            },
            llm: LlmConfig {
                base_url: "https://llm-provider.invalid".to_string(),
                api_key: String::new(),
                timeout: Duration::from_secs(30),
                max_retries: 3,
                default_individual_prompt_id: "default-individual".to_string(),
                default_complete_prompt_id: "default-complete".to_string(),
            },
            notification: NotificationConfig {
                smtp_host: "localhost".to_string(),
                smtp_port: 587,
                smtp_username: String::new(),
                smtp_password: String::new(),
                from_address: "no-reply@example.invalid".to_string(),
                send_timeout: Duration::from_secs(10),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/callcore".to_string(),
                max_connections: 10,
            },
        }
    }
}

impl CallCoreConfig {
    /// Load configuration from an optional `callcore.toml` file, overlaid
    /// with `CALLCORE_*` environment variables, falling back to defaults.
    pub fn load(toml_path: Option<&str>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut figment = Figment::from(Serialized::defaults(CallCoreConfig::default()));
        if let Some(path) = toml_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("CALLCORE_").split("__"));

        figment
            .extract()
            .map_err(|e| CallCoreError::config(format!("failed to load configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = CallCoreConfig::default();
        assert!(cfg.concurrency.global_cap >= cfg.concurrency.default_tenant_cap);
        assert!(cfg.queue.direct_priority > cfg.queue.campaign_priority);
        assert!(
            cfg.queue.campaign_priority + cfg.queue.named_contact_priority_boost
                < cfg.queue.direct_priority
        );
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = CallCoreConfig::load(None).expect("defaults must load");
        assert_eq!(cfg.concurrency.global_cap, 100);
    }
}
