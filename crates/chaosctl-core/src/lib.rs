//! chaosctl-core: capability probing and resource negotiation
//!
//! Decides whether and how a chaos infrastructure agent can be installed
//! into a cluster, then drives registration, manifest apply and rollout.
//! All I/O goes through the traits in `chaos-rs` and [`prompt::Prompter`].

pub mod capability;
pub mod error;
pub mod namespace;
pub mod naming;
pub mod orchestrator;
pub mod platform;
pub mod prompt;
pub mod rollout;
pub mod saga;
pub mod service_account;
pub mod settings;
pub mod types;

#[cfg(test)]
mod testing;

pub use capability::CapabilityProber;
pub use error::ProvisionError;
pub use namespace::NamespaceResolver;
pub use naming::NameCollisionGuard;
pub use orchestrator::{
    require_sufficient, ProvisionFailure, ProvisionOutcome, ProvisionRequest,
    ProvisioningOrchestrator, Stage,
};
pub use platform::PlatformDetector;
pub use prompt::{Attempts, PromptField, Prompter};
pub use rollout::RolloutWatcher;
pub use saga::{Compensation, Saga, Unwound};
pub use service_account::ServiceAccountResolver;
pub use settings::ProvisionSettings;
pub use types::{
    CapabilityReport, InfraIdentity, InstallationScope, NamespacePlan, Platform, PlanSummary,
    RolloutState, ServiceAccountPlan,
};
