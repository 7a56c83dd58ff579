//! Provisioning errors

use chaos_rs::ChaosError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while negotiating or provisioning an agent
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Current identity lacks create permission on required resources
    #[error("permission denied: cannot create {}{}", .missing.join(", "), scope_suffix(.namespace))]
    PermissionDenied {
        missing: Vec<String>,
        namespace: Option<String>,
    },

    /// Agent name already registered in the project
    #[error("chaos infrastructure name '{name}' already exists in project {project_id}")]
    NameCollision { name: String, project_id: String },

    /// Namespace rejected (agent already present, or absent and uncreatable)
    #[error("namespace '{name}' cannot be used: {reason}")]
    NamespaceUnavailable { name: String, reason: String },

    /// Cluster API failure other than absence
    #[error("cluster error: {0}")]
    Cluster(#[source] ChaosError),

    /// Registry refused or failed the registration
    #[error("registration failed: {0}")]
    Registration(#[source] ChaosError),

    /// kubectl apply (or namespace creation for it) failed
    #[error("manifest apply failed: {0}")]
    ManifestApply(#[source] ChaosError),

    /// No running agent pod within the deadline
    #[error("agent did not reach Running within {}s", .0.as_secs())]
    RolloutTimedOut(Duration),

    /// Watch broke or closed before the agent was running
    #[error("rollout failed: {0}")]
    RolloutFailed(String),

    /// Interrupted by the user
    #[error("cancelled")]
    Cancelled,

    /// Retry cap hit while re-prompting
    #[error("gave up on {what} after {attempts} attempts")]
    ExhaustedRetries { what: &'static str, attempts: u32 },

    /// User declined the confirmation gate
    #[error("aborted by user")]
    Aborted,

    /// Prompt I/O failed
    #[error("prompt failed: {0}")]
    Prompt(String),
}

fn scope_suffix(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!(" in namespace {}", ns),
        None => String::new(),
    }
}

impl From<ChaosError> for ProvisionError {
    fn from(err: ChaosError) -> Self {
        ProvisionError::Cluster(err)
    }
}
