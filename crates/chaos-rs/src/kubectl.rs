//! kubectl command execution
//!
//! The agent manifest is rendered server-side and served at
//! `<endpoint>/api/file/<token>.yaml`; applying it is delegated to kubectl
//! so the user's kubeconfig, auth plugins and proxies all behave as usual.

use crate::error::ChaosError;
use crate::registry::RegistrationToken;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// What kubectl did to one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedObject {
    /// `kind/name` as printed by kubectl (e.g. `deployment.apps/subscriber`)
    pub object: String,
    /// `created`, `configured`, `unchanged`, ...
    pub action: String,
}

/// Output of a manifest apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutput {
    pub raw: String,
    pub objects: Vec<AppliedObject>,
}

impl ApplyOutput {
    /// Number of objects kubectl created
    pub fn created(&self) -> usize {
        self.objects.iter().filter(|o| o.action == "created").count()
    }
}

/// Applies (and removes) the agent manifest for a registration
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    async fn apply(&self, token: &RegistrationToken) -> Result<ApplyOutput, ChaosError>;

    async fn delete(&self, token: &RegistrationToken) -> Result<(), ChaosError>;
}

/// `ManifestApplier` shelling out to kubectl
#[derive(Debug, Clone)]
pub struct Kubectl {
    endpoint: String,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl Kubectl {
    pub fn new(endpoint: &str, kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            kubeconfig,
            context,
        }
    }

    /// URL of the rendered manifest for a registration
    pub fn manifest_url(&self, token: &RegistrationToken) -> String {
        format!("{}/api/file/{}.yaml", self.endpoint, token.token)
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args
    }
}

/// Execute a kubectl command and return stdout
async fn exec_kubectl(args: &[String]) -> Result<String, ChaosError> {
    let output = Command::new("kubectl")
        .args(args)
        .output()
        .await
        .map_err(ChaosError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ChaosError::Kubectl(stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[async_trait]
impl ManifestApplier for Kubectl {
    async fn apply(&self, token: &RegistrationToken) -> Result<ApplyOutput, ChaosError> {
        let mut args = self.base_args();
        args.extend(["apply".to_string(), "-f".to_string(), self.manifest_url(token)]);

        let raw = exec_kubectl(&args).await?;
        let output = parse_apply_output(&raw);
        tracing::info!(
            objects = output.objects.len(),
            created = output.created(),
            "Applied agent manifest"
        );
        Ok(output)
    }

    async fn delete(&self, token: &RegistrationToken) -> Result<(), ChaosError> {
        let mut args = self.base_args();
        args.extend([
            "delete".to_string(),
            "--ignore-not-found".to_string(),
            "-f".to_string(),
            self.manifest_url(token),
        ]);

        exec_kubectl(&args).await?;
        tracing::info!("Deleted agent manifest objects");
        Ok(())
    }
}

/// Parse `kubectl apply` output lines of the form `<kind/name> <action>`
pub fn parse_apply_output(raw: &str) -> ApplyOutput {
    let objects = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (object, action) = line.rsplit_once(' ')?;
            // Warnings and other chatter have no kind/name prefix
            if !object.contains('/') || object.contains(' ') {
                return None;
            }
            Some(AppliedObject {
                object: object.to_string(),
                action: action.to_string(),
            })
        })
        .collect();

    ApplyOutput {
        raw: raw.to_string(),
        objects,
    }
}
