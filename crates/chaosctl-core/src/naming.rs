//! Agent name uniqueness within a project
//!
//! The registry listing is re-fetched for every candidate. This is only a
//! courtesy check: the registry may still accept a duplicate registered by
//! someone else in between, which surfaces later as a registration conflict.

use crate::error::ProvisionError;
use crate::prompt::{Attempts, PromptField, Prompter};
use crate::settings::ProvisionSettings;
use crate::types::InfraIdentity;
use chaos_rs::RegistryApi;

/// Collisions after which the existing names are listed for the user
const SHOW_EXISTING_AFTER: u32 = 2;

pub struct NameCollisionGuard<'a> {
    registry: &'a dyn RegistryApi,
    settings: &'a ProvisionSettings,
}

impl<'a> NameCollisionGuard<'a> {
    pub fn new(registry: &'a dyn RegistryApi, settings: &'a ProvisionSettings) -> Self {
        Self { registry, settings }
    }

    /// Settle on a name not present in the project's latest listing
    ///
    /// A blank `proposed` name is asked for first.
    pub async fn ensure_unique(
        &self,
        prompter: &mut dyn Prompter,
        project_id: &str,
        proposed: &str,
    ) -> Result<InfraIdentity, ProvisionError> {
        let mut attempts = Attempts::new(
            PromptField::InfraName.label(),
            self.settings.attempt_cap(prompter.is_interactive()),
        );
        let mut collisions = 0;

        let mut candidate = match proposed.trim() {
            "" => ask(prompter, "Enter a name for the chaos infrastructure")?,
            name => name.to_string(),
        };

        loop {
            attempts.next()?;

            if candidate.is_empty() {
                prompter.warn("The chaos infrastructure name cannot be empty");
                candidate = ask(prompter, "Enter a name for the chaos infrastructure")?;
                continue;
            }

            let existing = self
                .registry
                .list_agent_names(project_id)
                .await
                .map_err(ProvisionError::Registration)?;

            if !existing.iter().any(|n| n == &candidate) {
                tracing::info!(project_id, name = %candidate, "Chaos infrastructure name is free");
                return Ok(InfraIdentity {
                    name: candidate,
                    project_id: project_id.to_string(),
                });
            }

            collisions += 1;
            let collision = ProvisionError::NameCollision {
                name: candidate.clone(),
                project_id: project_id.to_string(),
            };
            tracing::warn!(collisions, "{}", collision);
            prompter.warn(&collision.to_string());
            if collisions >= SHOW_EXISTING_AFTER {
                prompter.info(&format!(
                    "Existing chaos infrastructures in this project: {}",
                    existing.join(", ")
                ));
            }

            candidate = ask(prompter, "Enter a different name for the chaos infrastructure")?;
        }
    }
}

fn ask(prompter: &mut dyn Prompter, prompt: &str) -> Result<String, ProvisionError> {
    Ok(prompter
        .input(PromptField::InfraName, prompt, "")?
        .trim()
        .to_string())
}
