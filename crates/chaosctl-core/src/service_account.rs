//! Service account observation
//!
//! Never blocks the install: a missing account is created by the manifest.
//! Only absence is tolerated; any other lookup failure ends the run.

use crate::error::ProvisionError;
use crate::prompt::{PromptField, Prompter};
use crate::settings::ProvisionSettings;
use crate::types::{NamespacePlan, ServiceAccountPlan};
use chaos_rs::ClusterApi;

pub struct ServiceAccountResolver<'a> {
    cluster: &'a dyn ClusterApi,
    settings: &'a ProvisionSettings,
}

impl<'a> ServiceAccountResolver<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, settings: &'a ProvisionSettings) -> Self {
        Self { cluster, settings }
    }

    pub async fn resolve(
        &self,
        prompter: &mut dyn Prompter,
        namespace: &NamespacePlan,
        suggested: &str,
    ) -> Result<ServiceAccountPlan, ProvisionError> {
        let default = if suggested.trim().is_empty() {
            self.settings.default_service_account.as_str()
        } else {
            suggested.trim()
        };

        let answer = prompter.input(
            PromptField::ServiceAccount,
            "Enter the service account for the chaos infrastructure",
            default,
        )?;
        let name = match answer.trim() {
            "" => default.to_string(),
            other => other.to_string(),
        };

        // Nothing to look up in a namespace we have not created yet
        let exists = if !namespace.exists {
            false
        } else {
            match self
                .cluster
                .service_account_exists(&namespace.name, &name)
                .await
            {
                Ok(exists) => exists,
                Err(e) if e.is_not_found() => false,
                Err(e) => {
                    tracing::error!(
                        namespace = %namespace.name,
                        service_account = %name,
                        error = %e,
                        "Service account lookup failed"
                    );
                    return Err(ProvisionError::Cluster(e));
                }
            }
        };

        if exists {
            prompter.info(&format!(
                "Service account '{}' already exists in namespace '{}' and will be reused",
                name, namespace.name
            ));
        } else {
            prompter.info(&format!(
                "Service account '{}' will be created in namespace '{}'",
                name, namespace.name
            ));
        }

        Ok(ServiceAccountPlan { name, exists })
    }
}
