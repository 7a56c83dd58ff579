//! Kubernetes cluster access
//!
//! `ClusterApi` is the narrow set of cluster calls the provisioning engine
//! needs. `KubeCluster` implements it on top of `kube`.

use crate::error::ChaosError;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{watcher, WatchStreamExt},
    Client, Config,
};
use std::collections::BTreeMap;
use std::path::Path;

/// RBAC API group
pub const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// A single "can I <verb> <resource>" question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheck {
    pub verb: String,
    /// API group, empty for the core group
    pub group: String,
    /// Plural resource name as used by the API server (e.g. `clusterroles`)
    pub resource: String,
    /// Namespace for namespaced checks, `None` for cluster-wide
    pub namespace: Option<String>,
}

impl PermissionCheck {
    pub fn new(verb: &str, group: &str, resource: &str, namespace: Option<&str>) -> Self {
        Self {
            verb: verb.to_string(),
            group: group.to_string(),
            resource: resource.to_string(),
            namespace: namespace.map(|s| s.to_string()),
        }
    }

    /// Build the access review the API server expects
    pub fn to_review(&self) -> SelfSubjectAccessReview {
        SelfSubjectAccessReview {
            metadata: ObjectMeta::default(),
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(self.verb.clone()),
                    group: Some(self.group.clone()),
                    resource: Some(self.resource.clone()),
                    namespace: self.namespace.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        }
    }
}

impl std::fmt::Display for PermissionCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {} in namespace {}", self.verb, self.resource, ns),
            None => write!(f, "{} {}", self.verb, self.resource),
        }
    }
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Running => write!(f, "Running"),
            PodPhase::Succeeded => write!(f, "Succeeded"),
            PodPhase::Failed => write!(f, "Failed"),
            PodPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Minimal pod view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub phase: PodPhase,
}

/// One observation from the pod watch
pub type PodEvent = PodSummary;

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::parse)
            .unwrap_or(PodPhase::Unknown);
        Self { name, phase }
    }
}

/// Minimal node view for platform discovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSummary {
    pub name: String,
    pub provider_id: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            provider_id: node.spec.as_ref().and_then(|s| s.provider_id.clone()),
            labels: node.metadata.labels.clone().unwrap_or_default(),
        }
    }
}

/// Stream of pod observations
pub type PodEventStream = BoxStream<'static, Result<PodEvent, ChaosError>>;

/// Cluster operations used during provisioning
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Ask the API server whether the current identity may perform `check`
    async fn self_permission_check(&self, check: &PermissionCheck) -> Result<bool, ChaosError>;

    /// Whether the namespace exists
    async fn namespace_exists(&self, name: &str) -> Result<bool, ChaosError>;

    /// Create a namespace
    async fn create_namespace(&self, name: &str) -> Result<(), ChaosError>;

    /// Delete a namespace
    async fn delete_namespace(&self, name: &str) -> Result<(), ChaosError>;

    /// Pods matching a label selector in a namespace
    async fn list_pods_by_label(
        &self,
        namespace: &str,
        label: &str,
    ) -> Result<Vec<PodSummary>, ChaosError>;

    /// Whether the service account exists in the namespace
    async fn service_account_exists(&self, namespace: &str, name: &str)
        -> Result<bool, ChaosError>;

    /// Watch pods matching a label selector in a namespace
    async fn watch_pods_by_label(
        &self,
        namespace: &str,
        label: &str,
    ) -> Result<PodEventStream, ChaosError>;

    /// Nodes in the cluster
    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ChaosError>;
}

/// `ClusterApi` backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig/context, or the inferred default
    pub async fn connect(
        kubeconfig: Option<&Path>,
        context: Option<&str>,
    ) -> Result<Self, ChaosError> {
        let options = KubeConfigOptions {
            context: context.map(|s| s.to_string()),
            ..Default::default()
        };

        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| ChaosError::ClientCreate(e.to_string()))?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| ChaosError::ClientCreate(e.to_string()))?
            }
            None if context.is_some() => Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ChaosError::ClientCreate(e.to_string()))?,
            None => Config::infer()
                .await
                .map_err(|e| ChaosError::ClientCreate(e.to_string()))?,
        };

        let client =
            Client::try_from(config).map_err(|e| ChaosError::ClientCreate(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn self_permission_check(&self, check: &PermissionCheck) -> Result<bool, ChaosError> {
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let review = api.create(&PostParams::default(), &check.to_review()).await?;

        let allowed = review.status.map(|s| s.allowed).unwrap_or(false);
        tracing::debug!(%check, allowed, "Self permission check");
        Ok(allowed)
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ChaosError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(_) => Ok(true),
            Err(e) => match ChaosError::from_kube(e, "namespace", name) {
                err if err.is_not_found() => Ok(false),
                err => Err(err),
            },
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ChaosError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        api.create(&PostParams::default(), &namespace)
            .await
            .map_err(|e| ChaosError::from_kube(e, "namespace", name))?;
        tracing::info!(namespace = name, "Created namespace");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ChaosError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ChaosError::from_kube(e, "namespace", name))?;
        tracing::info!(namespace = name, "Deleted namespace");
        Ok(())
    }

    async fn list_pods_by_label(
        &self,
        namespace: &str,
        label: &str,
    ) -> Result<Vec<PodSummary>, ChaosError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(label)).await?;
        Ok(pods.items.iter().map(PodSummary::from).collect())
    }

    async fn service_account_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<bool, ChaosError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(_) => Ok(true),
            Err(e) => match ChaosError::from_kube(e, "serviceaccount", name) {
                err if err.is_not_found() => Ok(false),
                err => Err(err),
            },
        }
    }

    async fn watch_pods_by_label(
        &self,
        namespace: &str,
        label: &str,
    ) -> Result<PodEventStream, ChaosError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().labels(label);

        tracing::debug!(namespace, label, "Opening pod watch");
        let stream = watcher(api, config)
            .default_backoff()
            .applied_objects()
            .map(|item| match item {
                Ok(pod) => Ok(PodEvent::from(&pod)),
                Err(e) => Err(ChaosError::Watch(e.to_string())),
            })
            .boxed();
        Ok(stream)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ChaosError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&ListParams::default()).await?;
        Ok(nodes.items.iter().map(NodeSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, PodStatus};

    #[test]
    fn test_permission_check_review() {
        let check = PermissionCheck::new("create", RBAC_GROUP, "roles", Some("litmus"));
        let review = check.to_review();
        let attrs = review.spec.resource_attributes.unwrap();
        assert_eq!(attrs.verb.as_deref(), Some("create"));
        assert_eq!(attrs.group.as_deref(), Some(RBAC_GROUP));
        assert_eq!(attrs.resource.as_deref(), Some("roles"));
        assert_eq!(attrs.namespace.as_deref(), Some("litmus"));
        assert!(review.status.is_none());
    }

    #[test]
    fn test_permission_check_display() {
        let cluster = PermissionCheck::new("create", RBAC_GROUP, "clusterroles", None);
        assert_eq!(cluster.to_string(), "create clusterroles");

        let namespaced = PermissionCheck::new("create", RBAC_GROUP, "rolebindings", Some("ops"));
        assert_eq!(namespaced.to_string(), "create rolebindings in namespace ops");
    }

    #[test]
    fn test_pod_summary_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("subscriber-abc".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let summary = PodSummary::from(&pod);
        assert_eq!(summary.name, "subscriber-abc");
        assert_eq!(summary.phase, PodPhase::Running);
    }

    #[test]
    fn test_pod_without_status_is_unknown() {
        let pod = Pod::default();
        assert_eq!(PodSummary::from(&pod).phase, PodPhase::Unknown);
    }

    #[test]
    fn test_pod_phase_parse() {
        assert_eq!(PodPhase::parse("Pending"), PodPhase::Pending);
        assert_eq!(PodPhase::parse("Succeeded"), PodPhase::Succeeded);
        assert_eq!(PodPhase::parse("Failed"), PodPhase::Failed);
        assert_eq!(PodPhase::parse("running"), PodPhase::Unknown);
    }

    #[test]
    fn test_node_summary_from_node() {
        let mut labels = BTreeMap::new();
        labels.insert("kubernetes.io/os".to_string(), "linux".to_string());
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some("aws:///us-east-1a/i-0abc".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let summary = NodeSummary::from(&node);
        assert_eq!(summary.name, "worker-1");
        assert_eq!(summary.provider_id.as_deref(), Some("aws:///us-east-1a/i-0abc"));
        assert_eq!(summary.labels.get("kubernetes.io/os").map(String::as_str), Some("linux"));
    }
}
