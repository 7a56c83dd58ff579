//! Platform discovery
//!
//! Guesses the Kubernetes distribution from node provider IDs and labels.
//! Detection is best effort: any failure falls back to `Others`.

use crate::types::Platform;
use chaos_rs::{ClusterApi, NodeSummary};

/// Classify a single node
pub fn classify_node(node: &NodeSummary) -> Platform {
    let has_label_prefix = |prefix: &str| node.labels.keys().any(|k| k.starts_with(prefix));

    // Distribution labels win over the cloud provider underneath
    if has_label_prefix("node.openshift.io/") {
        return Platform::OpenShift;
    }
    if has_label_prefix("rke.cattle.io/") || has_label_prefix("cattle.io/") {
        return Platform::Rancher;
    }

    let provider = node.provider_id.as_deref().unwrap_or("").to_lowercase();
    if provider.starts_with("aws://") || has_label_prefix("eks.amazonaws.com/") {
        Platform::Aws
    } else if provider.starts_with("gce://") || has_label_prefix("cloud.google.com/gke") {
        Platform::Gke
    } else if provider.starts_with("azure://") || has_label_prefix("kubernetes.azure.com/") {
        Platform::Azure
    } else {
        Platform::Others
    }
}

/// Classify a cluster from its nodes; the most common answer wins
pub fn classify_nodes(nodes: &[NodeSummary]) -> Platform {
    let mut best = Platform::Others;
    let mut best_count = 0;

    for candidate in Platform::ALL {
        if candidate == Platform::Others {
            continue;
        }
        let count = nodes.iter().filter(|n| classify_node(n) == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }

    best
}

pub struct PlatformDetector<'a> {
    cluster: &'a dyn ClusterApi,
}

impl<'a> PlatformDetector<'a> {
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self { cluster }
    }

    pub async fn detect(&self) -> Platform {
        match self.cluster.list_nodes().await {
            Ok(nodes) => {
                let platform = classify_nodes(&nodes);
                tracing::info!(%platform, nodes = nodes.len(), "Detected platform");
                platform
            }
            Err(e) => {
                tracing::warn!(error = %e, "Platform detection failed, assuming Others");
                Platform::Others
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;

    fn node(provider_id: Option<&str>, labels: &[&str]) -> NodeSummary {
        NodeSummary {
            name: "node".to_string(),
            provider_id: provider_id.map(|s| s.to_string()),
            labels: labels
                .iter()
                .map(|l| (l.to_string(), "true".to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_classify_by_provider_id() {
        assert_eq!(classify_node(&node(Some("aws:///us-east-1a/i-1"), &[])), Platform::Aws);
        assert_eq!(classify_node(&node(Some("gce://proj/zone/vm"), &[])), Platform::Gke);
        assert_eq!(
            classify_node(&node(Some("azure:///subscriptions/x"), &[])),
            Platform::Azure
        );
        assert_eq!(classify_node(&node(Some("kind://docker/kind/node"), &[])), Platform::Others);
        assert_eq!(classify_node(&node(None, &[])), Platform::Others);
    }

    #[test]
    fn test_distribution_labels_win() {
        let openshift_on_aws = node(Some("aws:///x"), &["node.openshift.io/os_id"]);
        assert_eq!(classify_node(&openshift_on_aws), Platform::OpenShift);

        let rancher = node(None, &["rke.cattle.io/machine"]);
        assert_eq!(classify_node(&rancher), Platform::Rancher);
    }

    #[test]
    fn test_majority_wins() {
        let nodes = vec![
            node(Some("gce://a"), &[]),
            node(Some("gce://b"), &[]),
            node(Some("aws:///c"), &[]),
            node(None, &[]),
        ];
        assert_eq!(classify_nodes(&nodes), Platform::Gke);
        assert_eq!(classify_nodes(&[]), Platform::Others);
    }

    #[tokio::test]
    async fn test_detection_error_falls_back() {
        let mut cluster = FakeCluster::new();
        cluster.nodes_error = Some("forbidden".to_string());
        assert_eq!(PlatformDetector::new(&cluster).detect().await, Platform::Others);

        let mut cluster = FakeCluster::new();
        cluster.nodes = vec![node(Some("aws:///x"), &[])];
        assert_eq!(PlatformDetector::new(&cluster).detect().await, Platform::Aws);
    }
}
