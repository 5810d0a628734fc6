use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::config::ClusterConnection;
use crate::error::RegistryError;

/// Where cluster connection details live.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ClusterConnection>, RegistryError>;
    async fn list(&self) -> Result<Vec<ClusterConnection>, RegistryError>;
    /// Adds or replaces the connection with the same name. Returns true when
    /// an existing entry was replaced.
    async fn upsert(&self, conn: ClusterConnection) -> Result<bool, RegistryError>;
}

/// Process-local store seeded from the config file.
#[derive(Default)]
pub struct MemoryClusterStore {
    clusters: RwLock<BTreeMap<String, ClusterConnection>>,
}

impl MemoryClusterStore {
    pub fn new(clusters: impl IntoIterator<Item = ClusterConnection>) -> Self {
        Self {
            clusters: RwLock::new(clusters.into_iter().map(|c| (c.name.clone(), c)).collect()),
        }
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn get(&self, name: &str) -> Result<Option<ClusterConnection>, RegistryError> {
        Ok(self.clusters.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<ClusterConnection>, RegistryError> {
        Ok(self.clusters.read().await.values().cloned().collect())
    }

    async fn upsert(&self, conn: ClusterConnection) -> Result<bool, RegistryError> {
        if conn.name.is_empty() {
            return Err(RegistryError::Store("cluster name must not be empty".to_string()));
        }
        let replaced = self
            .clusters
            .write()
            .await
            .insert(conn.name.clone(), conn)
            .is_some();
        Ok(replaced)
    }
}
