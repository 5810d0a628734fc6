//! Per-cluster sessions, created lazily on first use.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use crate::clients::aggregator::{ResourceAggregator, bounded};
use crate::clients::details::DetailCollector;
use crate::clients::{ClusterQueryClient, CollectorSettings, Connector};
use crate::error::{ClientError, RegistryError};
use crate::models::k8s::Gateway;
use crate::models::views::{ClusterInfo, NodeReadiness, NodeSummary, UNKNOWN};
use crate::store::ClusterStore;

/// A query client plus the collectors and caches built on it.
pub struct ClusterSession {
    pub cluster_id: String,
    pub overview: ResourceAggregator,
    pub details: DetailCollector,
    client: Arc<dyn ClusterQueryClient>,
    query_timeout: Duration,
}

impl ClusterSession {
    pub fn new(
        cluster_id: &str,
        client: Arc<dyn ClusterQueryClient>,
        settings: &CollectorSettings,
    ) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            overview: ResourceAggregator::new(cluster_id, client.clone(), settings),
            details: DetailCollector::new(cluster_id, client.clone(), settings),
            client,
            query_timeout: settings.query_timeout,
        }
    }

    /// Server version and per-node readiness. Uncached; both queries must
    /// succeed.
    pub async fn info(&self) -> Result<ClusterInfo, ClientError> {
        let c = self.client.as_ref();
        let t = self.query_timeout;
        let (version, nodes) = tokio::join!(
            bounded("version", t, c.get_cluster_version()),
            bounded("nodes", t, c.list_nodes()),
        );
        let (version, nodes) = (version?, nodes?);

        let summaries = nodes
            .iter()
            .map(|n| NodeSummary {
                name: n.metadata.name.clone().unwrap_or_default(),
                status: if n.is_ready() {
                    NodeReadiness::Ready
                } else {
                    NodeReadiness::NotReady
                },
            })
            .collect();

        Ok(ClusterInfo {
            cluster_version: if version.git_version.is_empty() {
                UNKNOWN.to_string()
            } else {
                version.git_version
            },
            node_count: nodes.len(),
            nodes: summaries,
        })
    }

    pub async fn gateways(&self, namespace: &str) -> Result<Vec<Gateway>, ClientError> {
        let list = self.client.list_gateways_in_namespace(namespace);
        bounded("gateways", self.query_timeout, list).await
    }
}

/// Maps cluster ids to sessions.
///
/// Concurrent first resolves of one id share a single construction; the
/// losers wait on the same cell instead of building duplicates.
pub struct ClusterRegistry {
    store: Arc<dyn ClusterStore>,
    connector: Arc<dyn Connector>,
    settings: CollectorSettings,
    sessions: DashMap<String, Arc<OnceCell<Arc<ClusterSession>>>>,
}

impl ClusterRegistry {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        connector: Arc<dyn Connector>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            store,
            connector,
            settings,
            sessions: DashMap::new(),
        }
    }

    pub fn store(&self) -> &dyn ClusterStore {
        self.store.as_ref()
    }

    /// Returns the session for `cluster_id`, building it on first use.
    /// A failed build leaves nothing behind; the next call retries.
    pub async fn resolve(&self, cluster_id: &str) -> Result<Arc<ClusterSession>, RegistryError> {
        let cell = self
            .sessions
            .entry(cluster_id.to_string())
            .or_default()
            .clone();

        let result = cell
            .get_or_try_init(|| self.build(cluster_id))
            .await
            .cloned();

        if result.is_err() {
            self.sessions
                .remove_if(cluster_id, |_, c| Arc::ptr_eq(c, &cell) && !c.initialized());
        }
        result
    }

    /// Drops the session so the next resolve rebuilds it from the store.
    pub fn invalidate(&self, cluster_id: &str) -> bool {
        let removed = self.sessions.remove(cluster_id).is_some();
        if removed {
            info!("[{}] session invalidated", cluster_id);
        }
        removed
    }

    /// Whether a session is currently built for `cluster_id`.
    pub fn is_connected(&self, cluster_id: &str) -> bool {
        self.sessions.get(cluster_id).is_some_and(|c| c.initialized())
    }

    async fn build(&self, cluster_id: &str) -> Result<Arc<ClusterSession>, RegistryError> {
        let conn = self
            .store
            .get(cluster_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(cluster_id.to_string()))?;

        let client = self
            .connector
            .connect(&conn)
            .map_err(|source| RegistryError::Unavailable {
                cluster: cluster_id.to_string(),
                source,
            })?;

        info!("[{}] session created for {}", cluster_id, conn.api_server);
        let session = ClusterSession::new(cluster_id, client, &self.settings);
        Ok(Arc::new(session))
    }
}
