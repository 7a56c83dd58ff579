//! Provisioning workflow
//!
//! A single forward pass through the stages below. Backtracking only
//! happens inside the name/namespace negotiation loops. Everything after
//! the confirmation gate has external side effects, which are recorded in
//! a saga and undone (newest first) if a later stage fails.
//!
//! 1. Capability check
//! 2. Name negotiation
//! 3. Namespace negotiation
//! 4. Service account negotiation
//! 5. User confirmation
//! 6. Remote registration
//! 7. Manifest apply
//! 8. Rollout watch

use crate::capability::CapabilityProber;
use crate::error::ProvisionError;
use crate::naming::NameCollisionGuard;
use crate::namespace::NamespaceResolver;
use crate::platform::PlatformDetector;
use crate::prompt::{PromptField, Prompter};
use crate::rollout::RolloutWatcher;
use crate::saga::{Compensation, Saga, Unwound};
use crate::service_account::ServiceAccountResolver;
use crate::settings::ProvisionSettings;
use crate::types::{CapabilityReport, InstallationScope, Platform, PlanSummary, RolloutState};
use chaos_rs::{
    ApplyOutput, ClusterApi, InfraDescriptor, ManifestApplier, RegistrationToken, RegistryApi,
};
use std::future::Future;
use thiserror::Error;

/// Infrastructure type reported to the registry
const INFRASTRUCTURE_TYPE: &str = "Kubernetes";

/// Workflow stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    CapabilityCheck,
    NameNegotiation,
    NamespaceNegotiation,
    ServiceAccountNegotiation,
    UserConfirm,
    RemoteRegister,
    ManifestApply,
    RolloutWatch,
    Done,
    Failed,
}

impl Stage {
    /// Step number (1-based) for display, 0 outside the main sequence
    pub fn step_number(&self) -> usize {
        match self {
            Stage::CapabilityCheck => 1,
            Stage::NameNegotiation => 2,
            Stage::NamespaceNegotiation => 3,
            Stage::ServiceAccountNegotiation => 4,
            Stage::UserConfirm => 5,
            Stage::RemoteRegister => 6,
            Stage::ManifestApply => 7,
            Stage::RolloutWatch => 8,
            Stage::Init | Stage::Done | Stage::Failed => 0,
        }
    }

    pub fn total_steps() -> usize {
        8
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Init => "Starting",
            Stage::CapabilityCheck => "Permission check",
            Stage::NameNegotiation => "Name selection",
            Stage::NamespaceNegotiation => "Namespace selection",
            Stage::ServiceAccountNegotiation => "Service account selection",
            Stage::UserConfirm => "Confirmation",
            Stage::RemoteRegister => "Registration",
            Stage::ManifestApply => "Manifest apply",
            Stage::RolloutWatch => "Rollout",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Inputs for one run; blank fields are prompted for
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub project_id: String,
    pub scope: InstallationScope,
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub service_account: String,
    pub platform: Option<Platform>,
    pub environment_id: Option<String>,
    pub node_selector: Option<String>,
    pub skip_ssl: bool,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub summary: PlanSummary,
    pub registration: RegistrationToken,
    pub namespace_created: bool,
    pub apply: ApplyOutput,
    pub rollout: RolloutState,
}

/// A failed run: where it stopped, why, and what was undone
#[derive(Error, Debug)]
#[error("{stage} failed: {error}")]
pub struct ProvisionFailure {
    pub stage: Stage,
    #[source]
    pub error: ProvisionError,
    pub unwound: Vec<Unwound>,
}

pub struct ProvisioningOrchestrator<'a> {
    cluster: &'a dyn ClusterApi,
    registry: &'a dyn RegistryApi,
    applier: &'a dyn ManifestApplier,
    settings: ProvisionSettings,
    stage: Stage,
}

impl<'a> ProvisioningOrchestrator<'a> {
    pub fn new(
        cluster: &'a dyn ClusterApi,
        registry: &'a dyn RegistryApi,
        applier: &'a dyn ManifestApplier,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            cluster,
            registry,
            applier,
            settings,
            stage: Stage::Init,
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn transition(&mut self, stage: Stage) {
        tracing::info!("Provisioning: {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Run the whole workflow
    ///
    /// `cancel` interrupts the rollout watch when it resolves.
    pub async fn run<C>(
        &mut self,
        prompter: &mut dyn Prompter,
        request: ProvisionRequest,
        cancel: C,
    ) -> Result<ProvisionOutcome, ProvisionFailure>
    where
        C: Future<Output = ()>,
    {
        let mut saga = Saga::new();

        match self.execute(prompter, request, cancel, &mut saga).await {
            Ok(outcome) => {
                self.transition(Stage::Done);
                Ok(outcome)
            }
            Err(error) => {
                let stage = self.stage;
                self.transition(Stage::Failed);
                tracing::error!(%stage, error = %error, "Provisioning failed");

                let unwound = if saga.is_empty() {
                    Vec::new()
                } else if self.settings.compensate_on_failure {
                    prompter.warn("Rolling back changes made so far");
                    saga.unwind(self.cluster, self.registry, self.applier).await
                } else {
                    for step in saga.steps() {
                        prompter.warn(&format!("Left in place, clean up manually: {}", step));
                    }
                    Vec::new()
                };

                Err(ProvisionFailure {
                    stage,
                    error,
                    unwound,
                })
            }
        }
    }

    async fn execute<C>(
        &mut self,
        prompter: &mut dyn Prompter,
        request: ProvisionRequest,
        cancel: C,
        saga: &mut Saga,
    ) -> Result<ProvisionOutcome, ProvisionError>
    where
        C: Future<Output = ()>,
    {
        let scope = request.scope;
        let cluster = self.cluster;
        let registry = self.registry;
        let applier = self.applier;
        let settings = self.settings.clone();
        let prober = CapabilityProber::new(cluster);

        // 1. Permissions for the chosen scope
        self.transition(Stage::CapabilityCheck);
        let project_id = match request.project_id.trim() {
            "" => prompter
                .input(PromptField::ProjectId, "Enter the project ID", "")?
                .trim()
                .to_string(),
            id => id.to_string(),
        };
        if project_id.is_empty() {
            return Err(ProvisionError::Prompt("a project ID is required".to_string()));
        }

        let probe_namespace = match request.namespace.trim() {
            "" => settings.default_namespace.clone(),
            ns => ns.to_string(),
        };
        // Without a requested namespace in namespace scope the user has not
        // picked one yet, so a denial here only warns
        let advisory = scope == InstallationScope::Namespace && request.namespace.trim().is_empty();
        let report = prober.probe(scope, &probe_namespace).await;
        if advisory {
            if let Err(denied) = require_sufficient(&report) {
                tracing::warn!(namespace = %probe_namespace, "{}", denied);
                prompter.warn(&format!(
                    "{}; choose a namespace where you hold these permissions",
                    denied
                ));
            }
        } else {
            require_sufficient(&report)?;
        }

        // 2. Unique agent name
        self.transition(Stage::NameNegotiation);
        let identity = NameCollisionGuard::new(registry, &settings)
            .ensure_unique(prompter, &project_id, &request.name)
            .await?;

        // 3. Namespace
        self.transition(Stage::NamespaceNegotiation);
        let mut namespace = NamespaceResolver::new(cluster, &settings)
            .resolve(prompter, scope, &probe_namespace)
            .await?;
        if scope == InstallationScope::Namespace && (advisory || namespace.name != probe_namespace) {
            let report = prober.probe(scope, &namespace.name).await;
            require_sufficient(&report)?;
        }

        // 4. Service account
        self.transition(Stage::ServiceAccountNegotiation);
        let service_account = ServiceAccountResolver::new(cluster, &settings)
            .resolve(prompter, &namespace, &request.service_account)
            .await?;

        let platform = match request.platform {
            Some(platform) => platform,
            None => {
                let detected = PlatformDetector::new(cluster).detect().await;
                if prompter.is_interactive() {
                    let names: Vec<&str> = Platform::ALL.iter().map(|p| p.as_str()).collect();
                    let default = Platform::ALL
                        .iter()
                        .position(|p| *p == detected)
                        .unwrap_or(Platform::ALL.len() - 1);
                    let index = prompter.select(
                        PromptField::Platform,
                        "Select the platform hosting the cluster",
                        &names,
                        default,
                    )?;
                    Platform::ALL.get(index).copied().unwrap_or(detected)
                } else {
                    detected
                }
            }
        };

        // 5. Confirmation gate
        self.transition(Stage::UserConfirm);
        let summary = PlanSummary {
            identity,
            scope,
            namespace: namespace.clone(),
            service_account,
            platform,
            description: request.description.clone(),
            environment_id: request.environment_id.clone(),
            node_selector: request.node_selector.clone(),
            skip_ssl: request.skip_ssl,
        };
        if !prompter.review(&summary)? {
            return Err(ProvisionError::Aborted);
        }

        // 6. Registration
        self.transition(Stage::RemoteRegister);
        let descriptor = descriptor_for(&summary);
        let registration = registry
            .register_agent(&descriptor)
            .await
            .map_err(|e| {
                if e.is_already_exists() {
                    ProvisionError::NameCollision {
                        name: descriptor.name.clone(),
                        project_id: descriptor.project_id.clone(),
                    }
                } else {
                    ProvisionError::Registration(e)
                }
            })?;
        saga.record(Compensation::Deregister {
            project_id: project_id.clone(),
            infra_id: registration.infra_id.clone(),
        });
        prompter.info(&format!(
            "Chaos infrastructure '{}' registered ({})",
            registration.name, registration.infra_id
        ));

        // 7. Namespace and manifest
        self.transition(Stage::ManifestApply);
        let namespace_created = namespace.ensure_created(cluster).await?;
        if namespace_created {
            saga.record(Compensation::DeleteNamespace {
                name: namespace.name.clone(),
            });
        }
        // Recorded up front: a partial apply still leaves objects behind
        saga.record(Compensation::DeleteManifest {
            token: registration.clone(),
        });
        let apply = applier
            .apply(&registration)
            .await
            .map_err(ProvisionError::ManifestApply)?;
        prompter.info(&format!(
            "Applied manifest: {} object(s), {} created",
            apply.objects.len(),
            apply.created()
        ));

        // 8. Rollout
        self.transition(Stage::RolloutWatch);
        prompter.info("Waiting for the chaos infrastructure to start");
        let rollout = RolloutWatcher::new(cluster, settings.rollout_timeout)
            .watch_until_running(&namespace.name, &settings.agent_label, cancel)
            .await;
        match &rollout {
            RolloutState::Running { .. } => {}
            RolloutState::TimedOut { after } => {
                return Err(ProvisionError::RolloutTimedOut(*after));
            }
            RolloutState::Cancelled => return Err(ProvisionError::Cancelled),
            RolloutState::Failed { reason } => {
                return Err(ProvisionError::RolloutFailed(reason.clone()));
            }
            RolloutState::Pending => {
                return Err(ProvisionError::RolloutFailed(
                    "rollout ended while still pending".to_string(),
                ));
            }
        }

        Ok(ProvisionOutcome {
            summary,
            registration,
            namespace_created,
            apply,
            rollout,
        })
    }
}

/// Turn an insufficient report into a fatal error
pub fn require_sufficient(report: &CapabilityReport) -> Result<(), ProvisionError> {
    if report.sufficient() {
        return Ok(());
    }
    Err(ProvisionError::PermissionDenied {
        missing: report.missing().iter().map(|s| s.to_string()).collect(),
        namespace: report.namespace.clone(),
    })
}

/// Registration request for a confirmed plan
///
/// The namespace is always reported as existing: this tool creates it
/// before the manifest is applied, so the manifest must not own it.
fn descriptor_for(summary: &PlanSummary) -> InfraDescriptor {
    InfraDescriptor {
        project_id: summary.identity.project_id.clone(),
        name: summary.identity.name.clone(),
        description: summary.description.clone(),
        platform_name: summary.platform.as_str().to_string(),
        environment_id: summary.environment_id.clone(),
        infrastructure_type: INFRASTRUCTURE_TYPE.to_string(),
        infra_scope: summary.scope.as_str().to_string(),
        infra_namespace: summary.namespace.name.clone(),
        service_account: summary.service_account.name.clone(),
        infra_ns_exists: true,
        infra_sa_exists: summary.service_account.exists,
        skip_ssl: summary.skip_ssl,
        node_selector: summary.node_selector.clone(),
    }
}
