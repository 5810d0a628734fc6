use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::k8s::{Node, Pod, PodPhase};
use crate::quantity::{parse_cpu_or_zero, parse_memory_or_zero};

pub const UNKNOWN: &str = "Unknown";

/// One collection pass over a cluster, grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceOverview {
    pub nodes: NodeCounts,
    pub workloads: WorkloadCounts,
    pub discovery: DiscoveryCounts,
    pub configs: ConfigCounts,
    pub resources: ResourceTotals,
    pub metadata: OverviewMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub total: usize,
    pub ready: usize,
    pub not_ready: usize,
}

impl NodeCounts {
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let total = nodes.len();
        let ready = nodes.iter().filter(|n| n.is_ready()).count();
        Self {
            total,
            ready,
            not_ready: total - ready,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadCounts {
    pub pods: PodCounts,
    pub deployments: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PodCounts {
    pub total: usize,
    pub running: usize,
    pub pending: usize,
    pub failed: usize,
    pub succeeded: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryCounts {
    pub services: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfigCounts {
    pub configmaps: usize,
    pub secrets: usize,
    pub namespaces: usize,
}

/// Summed container requests and limits; cpu in cores, memory in GiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceTotals {
    pub cpu_requests: f64,
    pub memory_requests: f64,
    pub cpu_limits: f64,
    pub memory_limits: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewMetadata {
    pub last_updated: Option<DateTime<Utc>>,
}

/// Phase counts and resource totals derived from one pod listing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PodTally {
    pub counts: PodCounts,
    pub resources: ResourceTotals,
}

impl PodTally {
    pub fn from_pods(pods: &[Pod]) -> Self {
        let mut tally = PodTally::default();
        tally.counts.total = pods.len();

        for pod in pods {
            match pod.phase() {
                Some(PodPhase::Running) => tally.counts.running += 1,
                Some(PodPhase::Pending) => tally.counts.pending += 1,
                Some(PodPhase::Failed) => tally.counts.failed += 1,
                Some(PodPhase::Succeeded) => tally.counts.succeeded += 1,
                None => {}
            }

            for container in &pod.spec.containers {
                let r = &container.resources;
                tally.resources.cpu_requests += r.request("cpu").map_or(0.0, parse_cpu_or_zero);
                tally.resources.memory_requests +=
                    r.request("memory").map_or(0.0, parse_memory_or_zero);
                tally.resources.cpu_limits += r.limit("cpu").map_or(0.0, parse_cpu_or_zero);
                tally.resources.memory_limits +=
                    r.limit("memory").map_or(0.0, parse_memory_or_zero);
            }
        }

        tally
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceDetail {
    pub name: String,
    pub status: String,
    pub pods: usize,
    pub deployments: usize,
    pub services: usize,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeReadiness {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDetail {
    pub name: String,
    pub status: NodeReadiness,
    pub roles: Vec<String>,
    pub version: String,
    pub os_image: String,
    pub kernel_version: String,
    pub container_runtime: String,
    pub cpu_capacity: String,
    pub memory_capacity: String,
    pub pods_capacity: String,
    pub cpu_allocatable: String,
    pub memory_allocatable: String,
    pub pods_allocatable: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub status: NodeReadiness,
}

/// Version and node readiness for the cluster info endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterInfo {
    pub cluster_version: String,
    pub node_count: usize,
    pub nodes: Vec<NodeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(phase: &str, containers: serde_json::Value) -> Pod {
        serde_json::from_value(serde_json::json!({
            "status": {"phase": phase},
            "spec": {"containers": containers},
        }))
        .unwrap()
    }

    #[test]
    fn test_pod_tally_phases() {
        let pods = vec![
            pod("Running", serde_json::json!([])),
            pod("running", serde_json::json!([])),
            pod("Pending", serde_json::json!([])),
            pod("Failed", serde_json::json!([])),
            pod("Succeeded", serde_json::json!([])),
            pod("Evicted", serde_json::json!([])),
        ];
        let tally = PodTally::from_pods(&pods);
        assert_eq!(
            tally.counts,
            PodCounts {
                total: 6,
                running: 2,
                pending: 1,
                failed: 1,
                succeeded: 1,
            }
        );
    }

    #[test]
    fn test_pod_tally_resources() {
        let pods = vec![
            pod(
                "Running",
                serde_json::json!([
                    {"name": "app", "resources": {
                        "requests": {"cpu": "500m", "memory": "512Mi"},
                        "limits": {"cpu": "1", "memory": "1Gi"}
                    }},
                    {"name": "sidecar", "resources": {"requests": {"cpu": "100m"}}},
                    {"name": "bare"}
                ]),
            ),
            pod(
                "Pending",
                serde_json::json!([
                    {"name": "broken", "resources": {"requests": {"cpu": "lots", "memory": "128Mi"}}}
                ]),
            ),
        ];
        let r = PodTally::from_pods(&pods).resources;
        assert!((r.cpu_requests - 0.6).abs() < 1e-9);
        assert!((r.memory_requests - 0.625).abs() < 1e-9);
        assert!((r.cpu_limits - 1.0).abs() < 1e-9);
        assert!((r.memory_limits - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_node_counts_sum() {
        let ready: Node = serde_json::from_value(serde_json::json!({
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }))
        .unwrap();
        let counts = NodeCounts::from_nodes(&[ready, Node::default(), Node::default()]);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.ready, 1);
        assert_eq!(counts.ready + counts.not_ready, counts.total);
    }

    #[test]
    fn test_overview_serializes_grouped() {
        let overview = ResourceOverview::default();
        let v = serde_json::to_value(&overview).unwrap();
        assert_eq!(v["workloads"]["pods"]["running"], 0);
        assert_eq!(v["discovery"]["services"], 0);
        assert_eq!(v["configs"]["namespaces"], 0);
        assert!(v["metadata"]["last_updated"].is_null());
    }
}
