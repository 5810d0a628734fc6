//! In-memory cluster for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ClusterQueryClient, Connector};
use crate::config::ClusterConnection;
use crate::error::ClientError;
use crate::models::k8s::{
    ConfigMap, Deployment, Gateway, Namespace, Node, ObjectMeta, PartialObject, Pod, Secret,
    Service, VersionInfo,
};

#[derive(Default)]
pub struct FakeCluster {
    pub nodes: Vec<Node>,
    pub namespaces: Vec<Namespace>,
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub services: Vec<Service>,
    pub config_maps: Vec<ConfigMap>,
    pub secrets: Vec<Secret>,
    pub gateways: Vec<Gateway>,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

pub fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

pub fn object(name: &str, namespace: &str) -> PartialObject {
    PartialObject {
        metadata: meta(name, Some(namespace)),
    }
}

pub fn namespace(name: &str) -> Namespace {
    serde_json::from_value(serde_json::json!({
        "metadata": {"name": name, "creationTimestamp": "2024-05-01T10:00:00Z"},
        "status": {"phase": "Active"}
    }))
    .unwrap()
}

pub fn node(name: &str, ready: bool, labels: &[&str]) -> Node {
    let labels: HashMap<&str, &str> = labels.iter().map(|l| (*l, "")).collect();
    serde_json::from_value(serde_json::json!({
        "metadata": {"name": name, "labels": labels},
        "status": {
            "conditions": [{"type": "Ready", "status": if ready { "True" } else { "False" }}],
            "capacity": {"cpu": "4", "memory": "16Gi", "pods": "110"},
            "allocatable": {"cpu": "3900m", "memory": "15Gi"},
            "nodeInfo": {
                "kubeletVersion": "v1.29.1",
                "osImage": "Ubuntu 22.04",
                "kernelVersion": "6.1.0",
                "containerRuntimeVersion": "containerd://1.7.2"
            }
        }
    }))
    .unwrap()
}

pub fn pod(name: &str, namespace: &str, phase: &str, cpu_request: &str) -> Pod {
    serde_json::from_value(serde_json::json!({
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"containers": [{"name": "app", "resources": {"requests": {"cpu": cpu_request}}}]},
        "status": {"phase": phase}
    }))
    .unwrap()
}

impl FakeCluster {
    /// Three nodes, two namespaces, a handful of workloads.
    pub fn sample() -> Self {
        Self {
            nodes: vec![
                node("cp-1", true, &["node-role.kubernetes.io/control-plane"]),
                node("worker-1", true, &[]),
                node("worker-2", false, &[]),
            ],
            namespaces: vec![namespace("default"), namespace("apps")],
            pods: vec![
                pod("web-1", "apps", "Running", "500m"),
                pod("web-2", "apps", "Running", "500m"),
                pod("job-1", "apps", "Succeeded", "1"),
                pod("dns", "default", "Pending", "100m"),
            ],
            deployments: vec![object("web", "apps"), object("dns", "default")],
            services: vec![object("web", "apps"), object("kubernetes", "default")],
            config_maps: vec![object("settings", "apps")],
            secrets: vec![object("token", "apps"), object("tls", "default")],
            ..Default::default()
        }
    }

    /// Makes every call to `op` fail. `op` is the method name, with the
    /// namespace appended for per-namespace calls (`list_pods_in_namespace:apps`).
    pub fn fail(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn fail_all(&self) {
        for op in [
            "list_nodes",
            "list_namespaces",
            "list_pods_all_namespaces",
            "list_deployments_all_namespaces",
            "list_services_all_namespaces",
            "list_config_maps_all_namespaces",
            "list_secrets_all_namespaces",
        ] {
            self.fail(op);
        }
    }

    /// Makes every call to `op` hang for an hour before answering.
    pub fn stall(&self, op: &str) {
        self.stalled.lock().unwrap().insert(op.to_string());
    }

    /// Makes every call to `op` answer after `by`.
    pub fn delay(&self, op: &str, by: Duration) {
        self.delays.lock().unwrap().insert(op.to_string(), by);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    async fn record(&self, op: String) -> Result<(), ClientError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(op.clone()).or_default() += 1;
        let stalled = self.stalled.lock().unwrap().contains(&op);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }
        if self.failing.lock().unwrap().contains(&op) {
            return Err(ClientError::Status {
                path: op,
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn in_ns<T: Clone>(items: &[T], ns: &str, meta: impl Fn(&T) -> &ObjectMeta) -> Vec<T> {
        items
            .iter()
            .filter(|i| meta(i).namespace.as_deref() == Some(ns))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClusterQueryClient for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>, ClientError> {
        self.record("list_nodes".into()).await?;
        Ok(self.nodes.clone())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        self.record("list_namespaces".into()).await?;
        Ok(self.namespaces.clone())
    }

    async fn list_pods_all_namespaces(&self) -> Result<Vec<Pod>, ClientError> {
        self.record("list_pods_all_namespaces".into()).await?;
        Ok(self.pods.clone())
    }

    async fn list_pods_in_namespace(&self, ns: &str) -> Result<Vec<Pod>, ClientError> {
        self.record(format!("list_pods_in_namespace:{}", ns)).await?;
        Ok(Self::in_ns(&self.pods, ns, |p| &p.metadata))
    }

    async fn list_deployments_all_namespaces(&self) -> Result<Vec<Deployment>, ClientError> {
        self.record("list_deployments_all_namespaces".into()).await?;
        Ok(self.deployments.clone())
    }

    async fn list_deployments_in_namespace(
        &self,
        ns: &str,
    ) -> Result<Vec<Deployment>, ClientError> {
        self.record(format!("list_deployments_in_namespace:{}", ns)).await?;
        Ok(Self::in_ns(&self.deployments, ns, |d| &d.metadata))
    }

    async fn list_services_all_namespaces(&self) -> Result<Vec<Service>, ClientError> {
        self.record("list_services_all_namespaces".into()).await?;
        Ok(self.services.clone())
    }

    async fn list_services_in_namespace(&self, ns: &str) -> Result<Vec<Service>, ClientError> {
        self.record(format!("list_services_in_namespace:{}", ns)).await?;
        Ok(Self::in_ns(&self.services, ns, |s| &s.metadata))
    }

    async fn list_config_maps_all_namespaces(&self) -> Result<Vec<ConfigMap>, ClientError> {
        self.record("list_config_maps_all_namespaces".into()).await?;
        Ok(self.config_maps.clone())
    }

    async fn list_secrets_all_namespaces(&self) -> Result<Vec<Secret>, ClientError> {
        self.record("list_secrets_all_namespaces".into()).await?;
        Ok(self.secrets.clone())
    }

    async fn get_cluster_version(&self) -> Result<VersionInfo, ClientError> {
        self.record("get_cluster_version".into()).await?;
        Ok(VersionInfo {
            major: "1".to_string(),
            minor: "29".to_string(),
            git_version: "v1.29.1".to_string(),
            platform: "linux/amd64".to_string(),
        })
    }

    async fn list_gateways_in_namespace(&self, ns: &str) -> Result<Vec<Gateway>, ClientError> {
        self.record(format!("list_gateways_in_namespace:{}", ns)).await?;
        Ok(Self::in_ns(&self.gateways, ns, |g| &g.metadata))
    }
}

pub fn connection(name: &str) -> ClusterConnection {
    ClusterConnection {
        name: name.to_string(),
        api_server: format!("https://{}.example:6443", name),
        token: Some("secret".to_string()),
        token_file: None,
        ca_file: None,
        insecure_skip_tls_verify: false,
        description: None,
    }
}

/// Connector handing out [`FakeCluster::sample`] clusters, or one shared
/// cluster when built with [`FakeConnector::sharing`].
#[derive(Default)]
pub struct FakeConnector {
    shared: Option<Arc<FakeCluster>>,
    refused: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn sharing(cluster: Arc<FakeCluster>) -> Self {
        Self {
            shared: Some(cluster),
            ..Default::default()
        }
    }

    pub fn refuse(&self, cluster: &str) {
        self.refused.lock().unwrap().insert(cluster.to_string());
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        conn: &ClusterConnection,
    ) -> Result<Arc<dyn ClusterQueryClient>, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refused.lock().unwrap().contains(&conn.name) {
            return Err(ClientError::Connection {
                cluster: conn.name.clone(),
                reason: "connection refused".to_string(),
            });
        }
        match &self.shared {
            Some(cluster) => Ok(cluster.clone()),
            None => Ok(Arc::new(FakeCluster::sample())),
        }
    }
}
