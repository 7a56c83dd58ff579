//! Domain types for chaosctl
//!
//! Everything here lives for a single provisioning run; nothing is persisted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// An RBAC resource the agent's manifest needs to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbacResource {
    /// Singular kind, used as the report key
    pub kind: &'static str,
    /// Plural resource name for access reviews
    pub plural: &'static str,
}

const CLUSTER_RESOURCES: &[RbacResource] = &[
    RbacResource {
        kind: "clusterrole",
        plural: "clusterroles",
    },
    RbacResource {
        kind: "clusterrolebinding",
        plural: "clusterrolebindings",
    },
];

const NAMESPACE_RESOURCES: &[RbacResource] = &[
    RbacResource {
        kind: "role",
        plural: "roles",
    },
    RbacResource {
        kind: "rolebinding",
        plural: "rolebindings",
    },
];

/// Whether the agent is installed with cluster-wide or namespaced permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationScope {
    #[default]
    Cluster,
    Namespace,
}

impl InstallationScope {
    /// RBAC resources that must be creatable for this scope
    pub fn required_resources(&self) -> &'static [RbacResource] {
        match self {
            InstallationScope::Cluster => CLUSTER_RESOURCES,
            InstallationScope::Namespace => NAMESPACE_RESOURCES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationScope::Cluster => "cluster",
            InstallationScope::Namespace => "namespace",
        }
    }
}

impl std::fmt::Display for InstallationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstallationScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cluster" => Ok(InstallationScope::Cluster),
            "namespace" => Ok(InstallationScope::Namespace),
            other => Err(format!(
                "invalid installation mode '{}', expected 'cluster' or 'namespace'",
                other
            )),
        }
    }
}

/// Outcome of probing the RBAC resources for a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub scope: InstallationScope,
    pub namespace: Option<String>,
    /// Resource kind -> allowed
    pub allowed: BTreeMap<String, bool>,
    /// Resource kind -> error from the probe call (such resources are denied)
    pub errors: BTreeMap<String, String>,
}

impl CapabilityReport {
    pub fn new(scope: InstallationScope, namespace: Option<&str>) -> Self {
        Self {
            scope,
            namespace: namespace.map(|s| s.to_string()),
            allowed: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    /// True only if every resource required by the scope was allowed
    pub fn sufficient(&self) -> bool {
        self.scope
            .required_resources()
            .iter()
            .all(|r| self.allowed.get(r.kind).copied().unwrap_or(false))
    }

    /// Required resources that are not allowed
    pub fn missing(&self) -> Vec<&'static str> {
        self.scope
            .required_resources()
            .iter()
            .filter(|r| !self.allowed.get(r.kind).copied().unwrap_or(false))
            .map(|r| r.kind)
            .collect()
    }
}

/// Target namespace decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePlan {
    pub name: String,
    /// Observed in the cluster
    pub exists: bool,
    /// Current identity may create it (only probed when absent)
    pub may_create: bool,
}

impl NamespacePlan {
    /// A plan is usable unless the namespace is absent and uncreatable
    pub fn is_valid(&self) -> bool {
        self.exists || self.may_create
    }
}

/// Target service account observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountPlan {
    pub name: String,
    pub exists: bool,
}

/// Agent name, unique within its project at check time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraIdentity {
    pub name: String,
    pub project_id: String,
}

/// Where the rollout of the installed agent ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutState {
    Pending,
    Running { pod: String },
    Failed { reason: String },
    TimedOut { after: Duration },
    Cancelled,
}

impl RolloutState {
    pub fn is_running(&self) -> bool {
        matches!(self, RolloutState::Running { .. })
    }
}

impl std::fmt::Display for RolloutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloutState::Pending => write!(f, "Pending"),
            RolloutState::Running { pod } => write!(f, "Running ({})", pod),
            RolloutState::Failed { reason } => write!(f, "Failed: {}", reason),
            RolloutState::TimedOut { after } => write!(f, "Timed out after {}s", after.as_secs()),
            RolloutState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Kubernetes distribution hosting the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    Aws,
    Gke,
    Azure,
    OpenShift,
    Rancher,
    #[default]
    Others,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Aws,
        Platform::Gke,
        Platform::Azure,
        Platform::OpenShift,
        Platform::Rancher,
        Platform::Others,
    ];

    /// Name the control plane expects
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Aws => "AWS",
            Platform::Gke => "GKE",
            Platform::Azure => "Azure",
            Platform::OpenShift => "Openshift",
            Platform::Rancher => "Rancher",
            Platform::Others => "Others",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

/// Everything negotiated before the user confirmation gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub identity: InfraIdentity,
    pub scope: InstallationScope,
    pub namespace: NamespacePlan,
    pub service_account: ServiceAccountPlan,
    pub platform: Platform,
    pub description: String,
    pub environment_id: Option<String>,
    pub node_selector: Option<String>,
    pub skip_ssl: bool,
}
