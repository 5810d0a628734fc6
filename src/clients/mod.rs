pub mod aggregator;
pub mod details;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use reqwest::{Certificate, Client};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{ClusterConnection, Config};
use crate::error::ClientError;
use crate::models::k8s::{
    ConfigMap, Deployment, Gateway, List, Namespace, Node, Pod, Secret, Service, VersionInfo,
};

/// Knobs shared by every collector of a session.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub cache_ttl: Duration,
    pub query_timeout: Duration,
    pub max_concurrent_namespaces: usize,
}

impl From<&Config> for CollectorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            cache_ttl: cfg.cache_ttl(),
            query_timeout: cfg.query_timeout(),
            max_concurrent_namespaces: cfg.max_concurrent_namespaces,
        }
    }
}

/// Read-only view of one cluster's API.
#[async_trait]
pub trait ClusterQueryClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, ClientError>;
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError>;
    async fn list_pods_all_namespaces(&self) -> Result<Vec<Pod>, ClientError>;
    async fn list_pods_in_namespace(&self, ns: &str) -> Result<Vec<Pod>, ClientError>;
    async fn list_deployments_all_namespaces(&self) -> Result<Vec<Deployment>, ClientError>;
    async fn list_deployments_in_namespace(&self, ns: &str)
    -> Result<Vec<Deployment>, ClientError>;
    async fn list_services_all_namespaces(&self) -> Result<Vec<Service>, ClientError>;
    async fn list_services_in_namespace(&self, ns: &str) -> Result<Vec<Service>, ClientError>;
    async fn list_config_maps_all_namespaces(&self) -> Result<Vec<ConfigMap>, ClientError>;
    async fn list_secrets_all_namespaces(&self) -> Result<Vec<Secret>, ClientError>;
    async fn get_cluster_version(&self) -> Result<VersionInfo, ClientError>;
    async fn list_gateways_in_namespace(&self, ns: &str) -> Result<Vec<Gateway>, ClientError>;
}

/// Builds a query client from stored connection details.
pub trait Connector: Send + Sync {
    fn connect(&self, conn: &ClusterConnection)
    -> Result<Arc<dyn ClusterQueryClient>, ClientError>;
}

/// Kubernetes REST client authenticated with a bearer token.
pub struct KubeClient {
    pub name: String,
    pub address: String,
    token: Option<String>,
    http: Client,
}

impl KubeClient {
    pub fn new(conn: &ClusterConnection, timeout: Duration) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::Connection {
            cluster: conn.name.clone(),
            reason,
        };

        if !conn.api_server.starts_with("http://") && !conn.api_server.starts_with("https://") {
            return Err(invalid(format!(
                "api_server {:?} must be an http(s) URL",
                conn.api_server
            )));
        }

        let mut builder = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(conn.insecure_skip_tls_verify);

        if let Some(ca_file) = &conn.ca_file {
            let pem = std::fs::read(ca_file)
                .map_err(|e| invalid(format!("reading {}: {}", ca_file.display(), e)))?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| invalid(format!("parsing {}: {}", ca_file.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let token = match (&conn.token, &conn.token_file) {
            (Some(t), _) => Some(t.clone()),
            (None, Some(path)) => Some(
                std::fs::read_to_string(path)
                    .map_err(|e| invalid(format!("reading {}: {}", path.display(), e)))?
                    .trim()
                    .to_string(),
            ),
            (None, None) => None,
        };

        let http = builder
            .build()
            .map_err(|e| invalid(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            name: conn.name.clone(),
            address: conn.api_server.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!("[{}] GET {}", self.name, path);
        let mut req = self
            .http
            .get(format!("{}{}", self.address, path))
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|source| ClientError::Transport {
            path: path.to_string(),
            source,
        })?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json().await.map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ClientError> {
        let list: List<T> = self.get_json(path).await?;
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterQueryClient for KubeClient {
    async fn list_nodes(&self) -> Result<Vec<Node>, ClientError> {
        self.list("/api/v1/nodes").await
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        self.list("/api/v1/namespaces").await
    }

    async fn list_pods_all_namespaces(&self) -> Result<Vec<Pod>, ClientError> {
        self.list("/api/v1/pods").await
    }

    async fn list_pods_in_namespace(&self, ns: &str) -> Result<Vec<Pod>, ClientError> {
        self.list(&format!("/api/v1/namespaces/{}/pods", ns)).await
    }

    async fn list_deployments_all_namespaces(&self) -> Result<Vec<Deployment>, ClientError> {
        self.list("/apis/apps/v1/deployments").await
    }

    async fn list_deployments_in_namespace(
        &self,
        ns: &str,
    ) -> Result<Vec<Deployment>, ClientError> {
        self.list(&format!("/apis/apps/v1/namespaces/{}/deployments", ns))
            .await
    }

    async fn list_services_all_namespaces(&self) -> Result<Vec<Service>, ClientError> {
        self.list("/api/v1/services").await
    }

    async fn list_services_in_namespace(&self, ns: &str) -> Result<Vec<Service>, ClientError> {
        self.list(&format!("/api/v1/namespaces/{}/services", ns))
            .await
    }

    async fn list_config_maps_all_namespaces(&self) -> Result<Vec<ConfigMap>, ClientError> {
        self.list("/api/v1/configmaps").await
    }

    async fn list_secrets_all_namespaces(&self) -> Result<Vec<Secret>, ClientError> {
        self.list("/api/v1/secrets").await
    }

    async fn get_cluster_version(&self) -> Result<VersionInfo, ClientError> {
        self.get_json("/version").await
    }

    async fn list_gateways_in_namespace(&self, ns: &str) -> Result<Vec<Gateway>, ClientError> {
        self.list(&format!(
            "/apis/networking.istio.io/v1beta1/namespaces/{}/gateways",
            ns
        ))
        .await
    }
}

/// Production connector producing [`KubeClient`]s.
pub struct KubeConnector {
    pub timeout: Duration,
}

impl Connector for KubeConnector {
    fn connect(
        &self,
        conn: &ClusterConnection,
    ) -> Result<Arc<dyn ClusterQueryClient>, ClientError> {
        Ok(Arc::new(KubeClient::new(conn, self.timeout)?))
    }
}
