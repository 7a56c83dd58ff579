//! Engine settings

use std::time::Duration;

/// Namespace offered when the user leaves the prompt blank
pub const DEFAULT_NAMESPACE: &str = "litmus";

/// Service account offered when the user leaves the prompt blank
pub const DEFAULT_SERVICE_ACCOUNT: &str = "litmus";

/// Label carried by the agent's pods
pub const DEFAULT_AGENT_LABEL: &str = "app=subscriber";

/// Default rollout deadline
pub const DEFAULT_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);

/// Retry cap applied to headless runs when none is configured
pub const HEADLESS_MAX_ATTEMPTS: u32 = 3;

/// Knobs for one provisioning run
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionSettings {
    pub default_namespace: String,
    pub default_service_account: String,
    pub agent_label: String,
    /// Cap on re-prompt loops; `None` means unbounded for interactive runs
    pub max_attempts: Option<u32>,
    pub rollout_timeout: Duration,
    /// Undo earlier side effects when a later step fails
    pub compensate_on_failure: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            default_service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            agent_label: DEFAULT_AGENT_LABEL.to_string(),
            max_attempts: None,
            rollout_timeout: DEFAULT_ROLLOUT_TIMEOUT,
            compensate_on_failure: true,
        }
    }
}

impl ProvisionSettings {
    /// Effective retry cap for a prompter
    pub fn attempt_cap(&self, interactive: bool) -> Option<u32> {
        match (self.max_attempts, interactive) {
            (Some(cap), _) => Some(cap),
            (None, true) => None,
            (None, false) => Some(HEADLESS_MAX_ATTEMPTS),
        }
    }
}
