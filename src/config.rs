use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cluster id used when the process serves a single cluster.
pub const DEFAULT_CLUSTER: &str = "default";

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Serve the cluster this process runs in.
    Instant,
    /// Serve any number of clusters from the cluster store.
    Server,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_namespaces")]
    pub max_concurrent_namespaces: usize,
    #[serde(default)]
    pub clusters: Vec<ClusterConnection>,
    #[serde(default)]
    pub instant: Option<ClusterConnection>,
}

/// How to reach one cluster's API server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConnection {
    pub name: String,
    pub api_server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClusterConnection {
    /// Connection through the pod's service account.
    pub fn in_cluster() -> Result<Self, String> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| "KUBERNETES_SERVICE_HOST is not set; not running in a cluster")?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        // IPv6 service hosts need brackets in the URL
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        let sa = Path::new(SERVICE_ACCOUNT_DIR);
        Ok(Self {
            name: DEFAULT_CLUSTER.to_string(),
            api_server: format!("https://{}:{}", host, port),
            token: None,
            token_file: Some(sa.join("token")),
            ca_file: Some(sa.join("ca.crt")),
            insecure_skip_tls_verify: false,
            description: Some("in-cluster service account".to_string()),
        })
    }

    /// Copy safe to hand out over the API.
    pub fn redacted(&self) -> Self {
        Self {
            token: None,
            ..self.clone()
        }
    }
}

fn default_listen_port() -> u16 {
    8000
}

fn default_mode() -> Mode {
    Mode::Server
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_namespaces() -> usize {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            mode: default_mode(),
            cache_ttl_secs: default_cache_ttl_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            max_concurrent_namespaces: default_max_concurrent_namespaces(),
            clusters: Vec::new(),
            instant: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("reading config {}: {}", path.display(), e))?;
        let cfg = Self::parse(&data)?;
        Ok(cfg)
    }

    pub fn parse(data: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let cfg: Config =
            serde_yaml::from_str(data).map_err(|e| format!("parsing config: {}", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), String> {
        if self.cache_ttl_secs == 0 {
            return Err("cache_ttl_secs must be greater than 0".to_string());
        }
        if self.query_timeout_secs == 0 {
            return Err("query_timeout_secs must be greater than 0".to_string());
        }
        if self.max_concurrent_namespaces == 0 {
            return Err("max_concurrent_namespaces must be greater than 0".to_string());
        }

        let mut seen = HashSet::new();
        for c in &self.clusters {
            if c.name.is_empty() {
                return Err("cluster name must not be empty".to_string());
            }
            if !seen.insert(c.name.as_str()) {
                return Err(format!("duplicate cluster {:?}", c.name));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Connections the cluster store starts with for the configured mode.
    pub fn initial_clusters(&self) -> Result<Vec<ClusterConnection>, String> {
        match self.mode {
            Mode::Server => Ok(self.clusters.clone()),
            Mode::Instant => {
                let mut conn = match &self.instant {
                    Some(c) => c.clone(),
                    None => ClusterConnection::in_cluster()?,
                };
                conn.name = DEFAULT_CLUSTER.to_string();
                Ok(vec![conn])
            }
        }
    }
}
