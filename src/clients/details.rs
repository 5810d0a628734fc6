use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cache::{Snapshot, TtlCache};
use crate::error::{CollectError, DetailError};
use crate::helpers::parse_timestamp;
use crate::models::k8s::{Namespace, Node};
use crate::models::views::{NamespaceDetail, NodeDetail, NodeReadiness, UNKNOWN};

use super::aggregator::{bounded, isolated};
use super::{ClusterQueryClient, CollectorSettings};

/// Per-namespace and per-node listings, each with its own TTL cache.
pub struct DetailCollector {
    cluster: String,
    client: Arc<dyn ClusterQueryClient>,
    query_timeout: Duration,
    max_concurrent_namespaces: usize,
    namespaces: TtlCache<Vec<NamespaceDetail>>,
    nodes: TtlCache<Vec<NodeDetail>>,
}

impl DetailCollector {
    pub fn new(
        cluster: impl Into<String>,
        client: Arc<dyn ClusterQueryClient>,
        settings: &CollectorSettings,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            client,
            query_timeout: settings.query_timeout,
            max_concurrent_namespaces: settings.max_concurrent_namespaces.max(1),
            namespaces: TtlCache::new("namespace details", settings.cache_ttl),
            nodes: TtlCache::new("node details", settings.cache_ttl),
        }
    }

    /// Namespaces in listing order with their workload counts.
    pub async fn get_namespaces_detail(
        &self,
        force_refresh: bool,
    ) -> Result<Snapshot<Vec<NamespaceDetail>>, CollectError> {
        self.namespaces
            .get_or_refresh(&self.cluster, force_refresh, || self.collect_namespaces())
            .await
    }

    pub async fn get_nodes_detail(
        &self,
        force_refresh: bool,
    ) -> Result<Snapshot<Vec<NodeDetail>>, CollectError> {
        self.nodes
            .get_or_refresh(&self.cluster, force_refresh, || self.collect_nodes())
            .await
    }

    async fn collect_namespaces(&self) -> Result<Vec<NamespaceDetail>, CollectError> {
        info!("[{}] collecting namespace details", self.cluster);
        let started = Instant::now();

        let list = self.client.list_namespaces();
        let namespaces = bounded("namespaces", self.query_timeout, list)
            .await
            .map_err(|source| CollectError::Listing {
                cluster: self.cluster.clone(),
                what: "namespaces",
                source,
            })?;

        // Futures are built up front so the stream holds no borrowing closure;
        // `buffered` yields in input order whatever the completion order.
        let pending: Vec<_> = namespaces
            .iter()
            .map(|ns| self.namespace_detail(ns))
            .collect();
        let results: Vec<Result<NamespaceDetail, DetailError>> = stream::iter(pending)
            .buffered(self.max_concurrent_namespaces)
            .collect()
            .await;

        let mut details = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(detail) => details.push(detail),
                Err(e) => warn!("[{}] skipping namespace: {}", self.cluster, e),
            }
        }

        info!(
            "[{}] {} of {} namespaces collected in {:.2}s",
            self.cluster,
            details.len(),
            namespaces.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(details)
    }

    async fn namespace_detail(&self, ns: &Namespace) -> Result<NamespaceDetail, DetailError> {
        let name = ns
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(DetailError::MissingName { kind: "namespace" })?;

        let id = self.cluster.as_str();
        let c = self.client.as_ref();
        let t = self.query_timeout;

        let (pods, deployments, services) = tokio::join!(
            isolated(id, "namespace pods", t, c.list_pods_in_namespace(name)),
            isolated(id, "namespace deployments", t, c.list_deployments_in_namespace(name)),
            isolated(id, "namespace services", t, c.list_services_in_namespace(name)),
        );

        if pods.is_none() && deployments.is_none() && services.is_none() {
            return Err(DetailError::NamespaceUnreadable(name.to_string()));
        }

        Ok(NamespaceDetail {
            name: name.to_string(),
            status: ns
                .status
                .phase
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            pods: pods.map_or(0, |p| p.len()),
            deployments: deployments.map_or(0, |d| d.len()),
            services: services.map_or(0, |s| s.len()),
            created_at: parse_timestamp(ns.metadata.creation_timestamp.as_deref()),
        })
    }

    async fn collect_nodes(&self) -> Result<Vec<NodeDetail>, CollectError> {
        info!("[{}] collecting node details", self.cluster);

        let nodes = bounded("nodes", self.query_timeout, self.client.list_nodes())
            .await
            .map_err(|source| CollectError::Listing {
                cluster: self.cluster.clone(),
                what: "nodes",
                source,
            })?;

        let mut details = Vec::with_capacity(nodes.len());
        for node in &nodes {
            match node_detail(node) {
                Ok(d) => details.push(d),
                Err(e) => warn!("[{}] skipping node: {}", self.cluster, e),
            }
        }

        info!(
            "[{}] {} of {} nodes collected",
            self.cluster,
            details.len(),
            nodes.len()
        );
        Ok(details)
    }
}

pub fn node_detail(node: &Node) -> Result<NodeDetail, DetailError> {
    let name = node
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(DetailError::MissingName { kind: "node" })?;

    let info = node.status.node_info.as_ref();
    let capacity = &node.status.capacity;
    let allocatable = &node.status.allocatable;

    Ok(NodeDetail {
        name: name.to_string(),
        status: if node.is_ready() {
            NodeReadiness::Ready
        } else {
            NodeReadiness::NotReady
        },
        roles: node.roles(),
        version: or_unknown(info.map(|i| &i.kubelet_version)),
        os_image: or_unknown(info.map(|i| &i.os_image)),
        kernel_version: or_unknown(info.map(|i| &i.kernel_version)),
        container_runtime: or_unknown(info.map(|i| &i.container_runtime_version)),
        cpu_capacity: or_unknown(capacity.get("cpu")),
        memory_capacity: or_unknown(capacity.get("memory")),
        pods_capacity: or_unknown(capacity.get("pods")),
        cpu_allocatable: or_unknown(allocatable.get("cpu")),
        memory_allocatable: or_unknown(allocatable.get("memory")),
        pods_allocatable: or_unknown(allocatable.get("pods")),
        created_at: parse_timestamp(node.metadata.creation_timestamp.as_deref()),
    })
}

fn or_unknown(value: Option<&String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string())
}
