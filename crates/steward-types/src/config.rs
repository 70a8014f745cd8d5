//! Engine configuration types for Steward.
//!
//! `EngineConfig` represents the `steward.toml` file in the data directory.
//! Every field has a default, so an empty or missing file is valid.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the automation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on how long the delay worker sleeps between queue checks.
    #[serde(default = "default_delay_poll_interval_ms")]
    pub delay_poll_interval_ms: u64,

    /// Maximum number of due delays claimed per worker tick.
    #[serde(default = "default_delay_batch_size")]
    pub delay_batch_size: u32,

    /// Claims older than this are considered abandoned and re-queued on startup.
    #[serde(default = "default_delay_claim_lease_secs")]
    pub delay_claim_lease_secs: u64,

    /// Timeout the webhook transport enforces on each call.
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    /// What happens when a delayed action resumes after its workflow was deactivated.
    #[serde(default)]
    pub inactive_resume: InactiveResumePolicy,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Message templates keyed by template id.
    #[serde(default)]
    pub templates: HashMap<String, TemplateConfig>,
}

fn default_delay_poll_interval_ms() -> u64 {
    1_000
}

fn default_delay_batch_size() -> u32 {
    64
}

fn default_delay_claim_lease_secs() -> u64 {
    300
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_event_bus_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delay_poll_interval_ms: default_delay_poll_interval_ms(),
            delay_batch_size: default_delay_batch_size(),
            delay_claim_lease_secs: default_delay_claim_lease_secs(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
            inactive_resume: InactiveResumePolicy::default(),
            event_bus_capacity: default_event_bus_capacity(),
            templates: HashMap::new(),
        }
    }
}

/// Behaviour of a delayed action whose workflow is no longer active when it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveResumePolicy {
    /// Run the action and the rest of the sequence anyway.
    #[default]
    Deliver,
    /// Mark the delayed action and every later action `skipped`.
    Skip,
}

/// A named message template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.delay_poll_interval_ms, 1_000);
        assert_eq!(config.delay_batch_size, 64);
        assert_eq!(config.webhook_timeout_secs, 10);
        assert_eq!(config.inactive_resume, InactiveResumePolicy::Deliver);
        assert!(config.templates.is_empty());
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.delay_claim_lease_secs, 300);
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
delay_poll_interval_ms = 250
inactive_resume = "skip"

[templates.welcome]
subject = "Welcome, {{ member.display_name }}"
body = "We are glad you joined us."

[templates.visit-sms]
body = "Thanks for visiting!"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.delay_poll_interval_ms, 250);
        assert_eq!(config.inactive_resume, InactiveResumePolicy::Skip);
        assert_eq!(config.templates.len(), 2);
        assert!(config.templates["visit-sms"].subject.is_none());
        assert_eq!(
            config.templates["welcome"].subject.as_deref(),
            Some("Welcome, {{ member.display_name }}")
        );
    }
}
