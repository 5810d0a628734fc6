use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cache::{Snapshot, TtlCache};
use crate::error::{ClientError, CollectError};
use crate::models::views::{
    ConfigCounts, DiscoveryCounts, NodeCounts, OverviewMetadata, PodTally, ResourceOverview,
    WorkloadCounts,
};

use super::{ClusterQueryClient, CollectorSettings};

const OVERVIEW_QUERIES: usize = 7;

/// Runs one sub-query under `timeout`; expiry is reported as
/// [`ClientError::Timeout`].
pub(crate) async fn bounded<T, F>(
    query: &str,
    timeout: Duration,
    fut: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            query: query.to_string(),
            after: timeout,
        }),
    }
}

/// Like [`bounded`], but a failure is logged and becomes `None`.
pub(crate) async fn isolated<T, F>(
    cluster: &str,
    query: &str,
    timeout: Duration,
    fut: F,
) -> Option<T>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match bounded(query, timeout, fut).await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("[{}] query {} failed: {}", cluster, query, e);
            None
        }
    }
}

/// Cluster-wide resource overview with a TTL cache.
pub struct ResourceAggregator {
    cluster: String,
    client: Arc<dyn ClusterQueryClient>,
    query_timeout: Duration,
    cache: TtlCache<ResourceOverview>,
}

impl ResourceAggregator {
    pub fn new(
        cluster: impl Into<String>,
        client: Arc<dyn ClusterQueryClient>,
        settings: &CollectorSettings,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            client,
            query_timeout: settings.query_timeout,
            cache: TtlCache::new("resource overview", settings.cache_ttl),
        }
    }

    pub async fn get_overview(
        &self,
        force_refresh: bool,
    ) -> Result<Snapshot<ResourceOverview>, CollectError> {
        self.cache
            .get_or_refresh(&self.cluster, force_refresh, || self.collect())
            .await
    }

    async fn collect(&self) -> Result<ResourceOverview, CollectError> {
        info!("[{}] collecting resource overview", self.cluster);
        let started = Instant::now();

        let id = self.cluster.as_str();
        let c = self.client.as_ref();
        let t = self.query_timeout;

        let (nodes, namespaces, pods, deployments, services, config_maps, secrets) = tokio::join!(
            isolated(id, "nodes", t, c.list_nodes()),
            isolated(id, "namespaces", t, c.list_namespaces()),
            isolated(id, "pods", t, c.list_pods_all_namespaces()),
            isolated(id, "deployments", t, c.list_deployments_all_namespaces()),
            isolated(id, "services", t, c.list_services_all_namespaces()),
            isolated(id, "configmaps", t, c.list_config_maps_all_namespaces()),
            isolated(id, "secrets", t, c.list_secrets_all_namespaces()),
        );

        let failed = [
            nodes.is_none(),
            namespaces.is_none(),
            pods.is_none(),
            deployments.is_none(),
            services.is_none(),
            config_maps.is_none(),
            secrets.is_none(),
        ]
        .into_iter()
        .filter(|f| *f)
        .count();

        if failed == OVERVIEW_QUERIES {
            return Err(CollectError::Unreachable {
                cluster: self.cluster.clone(),
                queries: OVERVIEW_QUERIES,
            });
        }

        let tally = pods.as_deref().map(PodTally::from_pods).unwrap_or_default();

        let overview = ResourceOverview {
            nodes: nodes
                .as_deref()
                .map(NodeCounts::from_nodes)
                .unwrap_or_default(),
            workloads: WorkloadCounts {
                pods: tally.counts,
                deployments: deployments.map_or(0, |d| d.len()),
            },
            discovery: DiscoveryCounts {
                services: services.map_or(0, |s| s.len()),
            },
            configs: ConfigCounts {
                configmaps: config_maps.map_or(0, |c| c.len()),
                secrets: secrets.map_or(0, |s| s.len()),
                namespaces: namespaces.map_or(0, |n| n.len()),
            },
            resources: tally.resources,
            metadata: OverviewMetadata {
                last_updated: Some(Utc::now()),
            },
        };

        info!(
            "[{}] resource overview collected in {:.2}s ({}/{} queries failed)",
            self.cluster,
            started.elapsed().as_secs_f64(),
            failed,
            OVERVIEW_QUERIES
        );
        Ok(overview)
    }
}
