//! RBAC capability probing
//!
//! Each required resource is checked with its own self access review. A
//! failed review counts as denied, and the remaining checks still run.

use crate::types::{CapabilityReport, InstallationScope};
use chaos_rs::{ClusterApi, PermissionCheck, RBAC_GROUP};

/// Verb the agent's manifest needs on every probed resource
const CREATE: &str = "create";

/// Probes whether the current identity can install an agent
pub struct CapabilityProber<'a> {
    cluster: &'a dyn ClusterApi,
}

impl<'a> CapabilityProber<'a> {
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self { cluster }
    }

    /// Check create permission on the scope's RBAC resources
    ///
    /// `namespace` is only used for [`InstallationScope::Namespace`].
    pub async fn probe(&self, scope: InstallationScope, namespace: &str) -> CapabilityReport {
        let namespace = match scope {
            InstallationScope::Cluster => None,
            InstallationScope::Namespace => Some(namespace),
        };
        let mut report = CapabilityReport::new(scope, namespace);

        for resource in scope.required_resources() {
            let check = PermissionCheck::new(CREATE, RBAC_GROUP, resource.plural, namespace);
            let allowed = match self.cluster.self_permission_check(&check).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    tracing::warn!(resource = resource.kind, error = %e, "Permission check failed");
                    report.errors.insert(resource.kind.to_string(), e.to_string());
                    false
                }
            };
            report.allowed.insert(resource.kind.to_string(), allowed);
        }

        tracing::info!(
            %scope,
            sufficient = report.sufficient(),
            missing = ?report.missing(),
            "Capability probe finished"
        );
        report
    }

    /// Whether the current identity may create `namespace`. Errors deny.
    pub async fn can_create_namespace(&self, namespace: &str) -> (bool, Option<String>) {
        let check = PermissionCheck::new(CREATE, "", "namespaces", None);
        match self.cluster.self_permission_check(&check).await {
            Ok(allowed) => (allowed, None),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Namespace permission check failed");
                (false, Some(e.to_string()))
            }
        }
    }
}
