//! Target namespace negotiation
//!
//! A namespace is accepted when it exists without an agent already in it,
//! or when it is absent and the current identity may create it. Anything
//! else is reported and the user is asked again.

use crate::capability::CapabilityProber;
use crate::error::ProvisionError;
use crate::prompt::{Attempts, PromptField, Prompter};
use crate::settings::ProvisionSettings;
use crate::types::{InstallationScope, NamespacePlan};
use chaos_rs::ClusterApi;

pub struct NamespaceResolver<'a> {
    cluster: &'a dyn ClusterApi,
    settings: &'a ProvisionSettings,
}

impl<'a> NamespaceResolver<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, settings: &'a ProvisionSettings) -> Self {
        Self { cluster, settings }
    }

    /// Negotiate a namespace, re-prompting until one is usable
    pub async fn resolve(
        &self,
        prompter: &mut dyn Prompter,
        scope: InstallationScope,
        suggested: &str,
    ) -> Result<NamespacePlan, ProvisionError> {
        let default = if suggested.trim().is_empty() {
            self.settings.default_namespace.as_str()
        } else {
            suggested.trim()
        };
        let mut attempts = Attempts::new(
            PromptField::Namespace.label(),
            self.settings.attempt_cap(prompter.is_interactive()),
        );

        loop {
            attempts.next()?;

            let answer = prompter.input(
                PromptField::Namespace,
                &format!("Enter the namespace for the {} scoped chaos infrastructure", scope),
                default,
            )?;
            let name = match answer.trim() {
                "" => default.to_string(),
                other => other.to_string(),
            };

            match self.evaluate(&name).await? {
                Ok(plan) => {
                    tracing::info!(
                        namespace = %plan.name,
                        exists = plan.exists,
                        may_create = plan.may_create,
                        "Namespace accepted"
                    );
                    return Ok(plan);
                }
                Err(rejection) => {
                    tracing::warn!(namespace = %name, "{}", rejection);
                    prompter.warn(&rejection.to_string());
                }
            }
        }
    }

    /// Decide on one candidate. The outer `Result` carries fatal cluster
    /// errors, the inner one a recoverable rejection.
    async fn evaluate(
        &self,
        name: &str,
    ) -> Result<Result<NamespacePlan, ProvisionError>, ProvisionError> {
        if self.cluster.namespace_exists(name).await? {
            let agents = self
                .cluster
                .list_pods_by_label(name, &self.settings.agent_label)
                .await?;
            if let Some(existing) = agents.first() {
                return Ok(Err(ProvisionError::NamespaceUnavailable {
                    name: name.to_string(),
                    reason: format!(
                        "a chaos infrastructure is already installed here (pod {})",
                        existing.name
                    ),
                }));
            }
            return Ok(Ok(NamespacePlan {
                name: name.to_string(),
                exists: true,
                may_create: false,
            }));
        }

        let (may_create, probe_error) = CapabilityProber::new(self.cluster)
            .can_create_namespace(name)
            .await;
        if !may_create {
            let reason = match probe_error {
                Some(e) => format!("it does not exist and the create check failed ({})", e),
                None => "it does not exist and you are not allowed to create it, \
                         provide an existing namespace"
                    .to_string(),
            };
            return Ok(Err(ProvisionError::NamespaceUnavailable {
                name: name.to_string(),
                reason,
            }));
        }

        Ok(Ok(NamespacePlan {
            name: name.to_string(),
            exists: false,
            may_create: true,
        }))
    }
}

impl NamespacePlan {
    /// Create the namespace if the plan says it is missing
    ///
    /// Returns whether this call created it. Once created (or found to
    /// already exist) the plan is marked as existing, so calling again is a
    /// no-op.
    pub async fn ensure_created(
        &mut self,
        cluster: &dyn ClusterApi,
    ) -> Result<bool, ProvisionError> {
        if self.exists {
            return Ok(false);
        }
        if !self.may_create {
            return Err(ProvisionError::NamespaceUnavailable {
                name: self.name.clone(),
                reason: "it does not exist and cannot be created".to_string(),
            });
        }

        match cluster.create_namespace(&self.name).await {
            Ok(()) => {
                self.exists = true;
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                tracing::info!(namespace = %self.name, "Namespace appeared concurrently, reusing it");
                self.exists = true;
                Ok(false)
            }
            Err(e) => Err(ProvisionError::Cluster(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Answer, FakeCluster, ScriptedPrompter};

    #[tokio::test]
    async fn test_absent_and_creatable() {
        let cluster = FakeCluster::new();
        let settings = ProvisionSettings::default();
        let mut prompter = ScriptedPrompter::new().answer(PromptField::Namespace, &["chaos"]);

        let plan = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Cluster, "")
            .await
            .unwrap();

        assert_eq!(
            plan,
            NamespacePlan {
                name: "chaos".to_string(),
                exists: false,
                may_create: true
            }
        );
    }

    #[tokio::test]
    async fn test_blank_answer_uses_default() {
        let cluster = FakeCluster::new().with_namespace("litmus");
        let settings = ProvisionSettings::default();
        let mut prompter = ScriptedPrompter::new().answer(PromptField::Namespace, &["  "]);

        let plan = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Namespace, "")
            .await
            .unwrap();
        assert_eq!(plan.name, "litmus");
        assert!(plan.exists);
    }

    #[tokio::test]
    async fn test_blank_answer_keeps_suggested_namespace() {
        let cluster = FakeCluster::new().with_namespace("team-a");
        let settings = ProvisionSettings::default();
        let mut prompter = ScriptedPrompter::new().answer(PromptField::Namespace, &[""]);

        let plan = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Namespace, "team-a")
            .await
            .unwrap();
        assert_eq!(plan.name, "team-a");
        assert!(plan.exists);
    }

    #[tokio::test]
    async fn test_existing_namespace_with_agent_is_rejected() {
        let cluster = FakeCluster::new()
            .with_namespace("litmus")
            .with_agent_pod("litmus", "subscriber-7f9")
            .with_namespace("chaos-2");
        let settings = ProvisionSettings::default();
        let mut prompter =
            ScriptedPrompter::new().answer(PromptField::Namespace, &["litmus", "chaos-2"]);

        let plan = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Cluster, "litmus")
            .await
            .unwrap();

        assert_eq!(plan.name, "chaos-2");
        assert!(plan.exists);
        assert_eq!(prompter.asked(PromptField::Namespace), 2);
        assert_eq!(prompter.warnings.len(), 1);
        assert!(prompter.warnings[0].contains("already installed"));
    }

    #[tokio::test]
    async fn test_absent_and_uncreatable_is_never_returned() {
        let cluster = FakeCluster::new()
            .answer("namespaces", None, Answer::Deny)
            .with_namespace("shared");
        let settings = ProvisionSettings::default();
        let mut prompter =
            ScriptedPrompter::new().answer(PromptField::Namespace, &["new-one", "shared"]);

        let plan = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Namespace, "")
            .await
            .unwrap();

        assert!(plan.is_valid());
        assert_eq!(plan.name, "shared");
        assert!(prompter.warnings[0].contains("not allowed to create"));
    }

    #[tokio::test]
    async fn test_probe_error_denies_creation() {
        let cluster = FakeCluster::new()
            .answer("namespaces", None, Answer::Error("etcd timeout".to_string()));
        let settings = ProvisionSettings {
            max_attempts: Some(2),
            ..Default::default()
        };
        let mut prompter = ScriptedPrompter::new().answer(PromptField::Namespace, &["a", "b"]);

        let err = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Cluster, "")
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ExhaustedRetries { attempts: 2, .. }));
        assert!(prompter.warnings.iter().all(|w| w.contains("etcd timeout")));
    }

    #[tokio::test]
    async fn test_headless_retry_cap() {
        let cluster = FakeCluster::new()
            .with_namespace("litmus")
            .with_agent_pod("litmus", "subscriber-0");
        let settings = ProvisionSettings::default();
        let mut prompter = ScriptedPrompter::new();
        prompter.interactive = false;

        let err = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Cluster, "litmus")
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ExhaustedRetries { attempts: 3, .. }));
        assert_eq!(prompter.asked(PromptField::Namespace), 3);
    }

    #[tokio::test]
    async fn test_cluster_error_is_fatal() {
        let cluster = FakeCluster::new();
        *cluster.namespace_error.lock().unwrap() = Some("connection reset".to_string());
        let settings = ProvisionSettings::default();
        let mut prompter = ScriptedPrompter::new();

        let err = NamespaceResolver::new(&cluster, &settings)
            .resolve(&mut prompter, InstallationScope::Cluster, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Cluster(_)));
        assert!(prompter.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_created_runs_once() {
        let cluster = FakeCluster::new();
        let mut plan = NamespacePlan {
            name: "chaos".to_string(),
            exists: false,
            may_create: true,
        };

        assert!(plan.ensure_created(&cluster).await.unwrap());
        assert!(plan.exists);
        assert!(!plan.ensure_created(&cluster).await.unwrap());
        assert_eq!(cluster.journal.count("create_namespace:"), 1);
    }

    #[tokio::test]
    async fn test_ensure_created_tolerates_race() {
        // Someone else created it between the check and our create
        let cluster = FakeCluster::new().with_namespace("chaos");
        let mut plan = NamespacePlan {
            name: "chaos".to_string(),
            exists: false,
            may_create: true,
        };

        assert!(!plan.ensure_created(&cluster).await.unwrap());
        assert!(plan.exists);
    }

    #[tokio::test]
    async fn test_ensure_created_refuses_invalid_plan() {
        let cluster = FakeCluster::new();
        let mut plan = NamespacePlan {
            name: "chaos".to_string(),
            exists: false,
            may_create: false,
        };
        assert!(plan.ensure_created(&cluster).await.is_err());
        assert_eq!(cluster.journal.count("create_namespace:"), 0);
    }
}
