//! chaos-rs: client SDK for chaos infrastructure provisioning
//!
//! Wraps the three external systems the provisioning engine talks to:
//! the target Kubernetes cluster, the control plane's agent registry,
//! and kubectl for manifest application.

pub mod cluster;
pub mod config;
pub mod error;
pub mod kubectl;
pub mod registry;

pub use cluster::{
    ClusterApi, KubeCluster, NodeSummary, PermissionCheck, PodEvent, PodEventStream, PodPhase,
    PodSummary, RBAC_GROUP,
};
pub use config::{ChaosConfig, Credentials};
pub use error::ChaosError;
pub use kubectl::{parse_apply_output, AppliedObject, ApplyOutput, Kubectl, ManifestApplier};
pub use registry::{GraphqlRegistry, InfraDescriptor, RegistrationToken, RegistryApi};
