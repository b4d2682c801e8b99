//! Service configuration schema.
//!
//! Every field carries a serde default so an unconfigured environment boots
//! with sensible values; `validate` rejects deliberate-but-broken operator
//! configuration before the server starts.

use form_relay_core::delivery_log::FailurePolicy;
use form_relay_core::dispatch::DispatchConfig;
use form_relay_core::orchestrator::OrchestratorConfig;
use form_relay_core::AccountId;
use serde::Deserialize;
use std::time::Duration;

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub dispatch: DispatchSettings,
    pub policy: PolicySettings,
    pub orchestrator: OrchestratorSettings,
    pub api_keys: Vec<ApiKeyEntry>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            dispatch: DispatchSettings::default(),
            policy: PolicySettings::default(),
            orchestrator: OrchestratorSettings::default(),
            api_keys: Vec::new(),
        }
    }
}

/// HTTP bind settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Outbound delivery timeout budgets, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub deliver_timeout_secs: u64,
    pub test_timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            deliver_timeout_secs: 30,
            test_timeout_secs: 10,
        }
    }
}

/// Automatic deactivation policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub failure_threshold: u32,
    pub failure_window_hours: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            failure_window_hours: 24,
        }
    }
}

/// Fan-out tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub concurrency: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

/// One API key and the account it authenticates
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub account: String,
}

impl ServiceConfig {
    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        if self.policy.failure_threshold == 0 {
            return Err("policy.failure_threshold must be at least 1".to_string());
        }
        if self.policy.failure_window_hours == 0 {
            return Err("policy.failure_window_hours must be at least 1".to_string());
        }
        if self.orchestrator.concurrency == 0 {
            return Err("orchestrator.concurrency must be at least 1".to_string());
        }
        if self.dispatch.deliver_timeout_secs == 0 || self.dispatch.test_timeout_secs == 0 {
            return Err("dispatch timeouts must be at least 1 second".to_string());
        }
        for entry in &self.api_keys {
            if entry.key.is_empty() {
                return Err("api_keys entries must have a non-empty key".to_string());
            }
            if entry.account.parse::<uuid::Uuid>().is_err() {
                return Err(format!(
                    "api_keys entry for '{}' has a non-UUID account id",
                    redact_key(&entry.key)
                ));
            }
        }
        Ok(())
    }

    /// `host:port` bind string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            deliver_timeout: Duration::from_secs(self.dispatch.deliver_timeout_secs),
            test_timeout: Duration::from_secs(self.dispatch.test_timeout_secs),
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::new(
            self.policy.failure_threshold,
            Duration::from_secs(self.policy.failure_window_hours * 3600),
        )
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            concurrency: self.orchestrator.concurrency,
        }
    }

    /// Parsed `(key, account)` pairs; call only after `validate`
    pub fn api_key_entries(&self) -> Vec<(String, AccountId)> {
        self.api_keys
            .iter()
            .filter_map(|entry| {
                entry
                    .account
                    .parse::<uuid::Uuid>()
                    .ok()
                    .map(|uuid| (entry.key.clone(), AccountId::from_uuid(uuid)))
            })
            .collect()
    }
}

/// Show only the key prefix in diagnostics
fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    format!("{}…", prefix)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
