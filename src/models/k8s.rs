use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// Read-side subsets of the Kubernetes API objects. Every field is optional on
// the wire; absent fields deserialize to their defaults.

pub const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";
pub const DEFAULT_ROLE: &str = "worker";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
}

/// List envelope shared by every `*List` kind.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Any object where only identity matters (counted kinds).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialObject {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

pub type Deployment = PartialObject;
pub type Service = PartialObject;
pub type ConfigMap = PartialObject;
pub type Secret = PartialObject;

// --- Pod ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: Option<HashMap<String, String>>,
    #[serde(default)]
    pub limits: Option<HashMap<String, String>>,
}

impl ResourceRequirements {
    pub fn request(&self, resource: &str) -> Option<&str> {
        self.requests.as_ref()?.get(resource).map(String::as_str)
    }

    pub fn limit(&self, resource: &str) -> Option<&str> {
        self.limits.as_ref()?.get(resource).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Running,
    Pending,
    Failed,
    Succeeded,
}

impl Pod {
    /// Lifecycle phase, matched case-insensitively. Unknown or missing phases
    /// yield `None`.
    pub fn phase(&self) -> Option<PodPhase> {
        let phase = self.status.phase.as_deref()?;
        match phase.to_ascii_lowercase().as_str() {
            "running" => Some(PodPhase::Running),
            "pending" => Some(PodPhase::Pending),
            "failed" => Some(PodPhase::Failed),
            "succeeded" => Some(PodPhase::Succeeded),
            _ => None,
        }
    }
}

// --- Node ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
    #[serde(default)]
    pub capacity: HashMap<String, String>,
    #[serde(default)]
    pub allocatable: HashMap<String, String>,
    #[serde(default)]
    pub node_info: Option<NodeSystemInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeCondition {
    #[serde(default, rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeSystemInfo {
    #[serde(default)]
    pub kubelet_version: String,
    #[serde(default)]
    pub os_image: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub container_runtime_version: String,
    #[serde(default)]
    pub architecture: String,
}

impl Node {
    /// True when any condition is `Ready` with status `True`.
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.condition_type == "Ready" && c.status == "True")
    }

    /// Role suffixes of `node-role.kubernetes.io/<role>` labels, or
    /// `["worker"]` when the node carries none.
    pub fn roles(&self) -> Vec<String> {
        let roles: Vec<String> = self
            .metadata
            .labels
            .keys()
            .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect();

        if roles.is_empty() {
            vec![DEFAULT_ROLE.to_string()]
        } else {
            roles
        }
    }
}

// --- Namespace ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Namespace {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NamespaceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamespaceStatus {
    #[serde(default)]
    pub phase: Option<String>,
}

// --- Istio Gateway ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Gateway {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: GatewaySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewaySpec {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub servers: Vec<GatewayServer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayServer {
    #[serde(default)]
    pub port: GatewayPort,
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayPort {
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
}

// --- Version ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub minor: String,
    #[serde(default)]
    pub git_version: String,
    #[serde(default)]
    pub platform: String,
}
