//! Compensation for external side effects
//!
//! Every step that changes something outside the process records how to
//! undo it. On a later failure the recorded steps run newest first.

use chaos_rs::{ChaosError, ClusterApi, ManifestApplier, RegistrationToken, RegistryApi};

/// Inverse of one completed side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Remove the registry record
    Deregister {
        project_id: String,
        infra_id: String,
    },
    /// Remove a namespace this run created
    DeleteNamespace { name: String },
    /// Remove the objects the manifest created
    DeleteManifest { token: RegistrationToken },
}

impl std::fmt::Display for Compensation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compensation::Deregister { infra_id, .. } => {
                write!(f, "deregister chaos infrastructure {}", infra_id)
            }
            Compensation::DeleteNamespace { name } => write!(f, "delete namespace {}", name),
            Compensation::DeleteManifest { token } => {
                write!(f, "delete manifest objects of {}", token.name)
            }
        }
    }
}

/// Result of running one compensation
#[derive(Debug)]
pub struct Unwound {
    pub compensation: Compensation,
    pub result: Result<(), ChaosError>,
}

/// Ordered list of recorded compensations
#[derive(Debug, Default)]
pub struct Saga {
    steps: Vec<Compensation>,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, compensation: Compensation) {
        tracing::debug!(%compensation, "Recorded compensation");
        self.steps.push(compensation);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Compensation] {
        &self.steps
    }

    /// Run all compensations newest first. Failures are logged and collected;
    /// they do not stop the remaining steps.
    pub async fn unwind(
        self,
        cluster: &dyn ClusterApi,
        registry: &dyn RegistryApi,
        applier: &dyn ManifestApplier,
    ) -> Vec<Unwound> {
        let mut results = Vec::with_capacity(self.steps.len());

        for compensation in self.steps.into_iter().rev() {
            let result = match &compensation {
                Compensation::Deregister {
                    project_id,
                    infra_id,
                } => registry.deregister_agent(project_id, infra_id).await,
                Compensation::DeleteNamespace { name } => cluster.delete_namespace(name).await,
                Compensation::DeleteManifest { token } => applier.delete(token).await,
            };

            match &result {
                Ok(()) => tracing::info!(%compensation, "Compensation done"),
                Err(e) => tracing::error!(%compensation, error = %e, "Compensation failed"),
            }
            results.push(Unwound {
                compensation,
                result,
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApplier, FakeCluster, FakeRegistry, Journal};

    fn token() -> RegistrationToken {
        RegistrationToken {
            token: "tok".to_string(),
            infra_id: "id-1".to_string(),
            name: "agent".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unwind_runs_newest_first() {
        let journal = Journal::default();
        let cluster = FakeCluster::new().with_journal(journal.clone());
        let registry = FakeRegistry::new().with_journal(journal.clone());
        let applier = FakeApplier::new().with_journal(journal.clone());

        let mut saga = Saga::new();
        saga.record(Compensation::Deregister {
            project_id: "p".to_string(),
            infra_id: "id-1".to_string(),
        });
        saga.record(Compensation::DeleteNamespace {
            name: "chaos".to_string(),
        });
        saga.record(Compensation::DeleteManifest { token: token() });

        let unwound = saga.unwind(&cluster, &registry, &applier).await;

        assert_eq!(unwound.len(), 3);
        assert!(unwound.iter().all(|u| u.result.is_ok()));
        assert_eq!(
            journal.entries(),
            vec!["delete_manifest:tok", "delete_namespace:chaos", "deregister:p/id-1"]
        );
    }

    #[tokio::test]
    async fn test_empty_saga() {
        let saga = Saga::new();
        assert!(saga.is_empty());
        let unwound = saga
            .unwind(&FakeCluster::new(), &FakeRegistry::new(), &FakeApplier::new())
            .await;
        assert!(unwound.is_empty());
    }

    #[test]
    fn test_display() {
        let c = Compensation::DeleteNamespace {
            name: "chaos".to_string(),
        };
        assert_eq!(c.to_string(), "delete namespace chaos");
    }
}
