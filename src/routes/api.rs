use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;
use crate::cache::{Snapshot, Source};
use crate::config::{ClusterConnection, DEFAULT_CLUSTER, Mode};
use crate::error::{ClientError, CollectError, RegistryError};
use crate::models::k8s::Gateway;
use crate::models::views::ClusterInfo;

const STALE_WARNING: &str = "110 - \"Response is Stale\"";

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// A cached view together with where it came from.
#[derive(Serialize)]
pub struct SnapshotResponse<'a, T> {
    pub cluster: &'a str,
    pub source: Source,
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: u64,
    pub data: &'a T,
}

#[derive(Serialize)]
pub struct ClusterListing {
    #[serde(flatten)]
    pub connection: ClusterConnection,
    pub connected: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub enum ApiError {
    Registry(RegistryError),
    Collect(CollectError),
    Upstream(ClientError),
    BadRequest(String),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Registry(e)
    }
}

impl From<CollectError> for ApiError {
    fn from(e: CollectError) -> Self {
        ApiError::Collect(e)
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        ApiError::Upstream(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Registry(e @ RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Registry(e @ RegistryError::Unavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Registry(e @ RegistryError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Collect(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::Upstream(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        if status.is_server_error() {
            warn!("request failed with {}: {}", status, error);
        }
        (status, Json(ErrorResponse { error })).into_response()
    }
}

fn snapshot_response<T: Serialize>(cluster: &str, snap: &Snapshot<T>) -> Response {
    let body = SnapshotResponse {
        cluster,
        source: snap.source,
        stale: snap.is_stale(),
        fetched_at: snap.entry.fetched_at,
        age_secs: snap.entry.age().as_secs(),
        data: &snap.entry.value,
    };
    let mut resp = Json(body).into_response();
    if snap.is_stale() {
        resp.headers_mut()
            .insert(header::WARNING, HeaderValue::from_static(STALE_WARNING));
    }
    resp
}

/// RFC 1123 label, the shape of a namespace name.
fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

pub async fn handle_healthz() -> &'static str {
    "ok\n"
}

pub async fn handle_list_clusters(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClusterListing>>, ApiError> {
    let clusters = state.registry.store().list().await?;
    let listings = clusters
        .into_iter()
        .map(|c| ClusterListing {
            connected: state.registry.is_connected(&c.name),
            connection: c.redacted(),
        })
        .collect();
    Ok(Json(listings))
}

pub async fn handle_upsert_cluster(
    State(state): State<AppState>,
    body: Result<Json<ClusterConnection>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(conn) = body?;
    if state.config.mode == Mode::Instant {
        return Err(ApiError::BadRequest(
            "clusters cannot be managed in instant mode".to_string(),
        ));
    }
    if conn.name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if !conn.api_server.starts_with("http://") && !conn.api_server.starts_with("https://") {
        return Err(ApiError::BadRequest(format!(
            "api_server {:?} must be an http(s) URL",
            conn.api_server
        )));
    }

    let name = conn.name.clone();
    let redacted = conn.redacted();
    let replaced = state.registry.store().upsert(conn).await?;
    // Sessions hold the old credentials until rebuilt.
    state.registry.invalidate(&name);

    if replaced {
        info!("cluster {} updated", name);
        Ok((StatusCode::OK, Json(redacted)).into_response())
    } else {
        info!("cluster {} added", name);
        Ok((StatusCode::CREATED, Json(redacted)).into_response())
    }
}

async fn overview(state: &AppState, cluster: &str, refresh: bool) -> Result<Response, ApiError> {
    let session = state.registry.resolve(cluster).await?;
    let snap = session.overview.get_overview(refresh).await?;
    Ok(snapshot_response(&session.cluster_id, &snap))
}

async fn namespaces(state: &AppState, cluster: &str, refresh: bool) -> Result<Response, ApiError> {
    let session = state.registry.resolve(cluster).await?;
    let snap = session.details.get_namespaces_detail(refresh).await?;
    Ok(snapshot_response(&session.cluster_id, &snap))
}

async fn nodes(state: &AppState, cluster: &str, refresh: bool) -> Result<Response, ApiError> {
    let session = state.registry.resolve(cluster).await?;
    let snap = session.details.get_nodes_detail(refresh).await?;
    Ok(snapshot_response(&session.cluster_id, &snap))
}

async fn cluster_info(state: &AppState, cluster: &str) -> Result<Json<ClusterInfo>, ApiError> {
    let session = state.registry.resolve(cluster).await?;
    Ok(Json(session.info().await?))
}

async fn gateways(
    state: &AppState,
    cluster: &str,
    namespace: &str,
) -> Result<Json<Vec<Gateway>>, ApiError> {
    if !is_dns_label(namespace) {
        return Err(ApiError::BadRequest(format!(
            "invalid namespace {:?}",
            namespace
        )));
    }
    let session = state.registry.resolve(cluster).await?;
    Ok(Json(session.gateways(namespace).await?))
}

pub async fn handle_overview(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    overview(&state, &cluster, q.refresh).await
}

pub async fn handle_namespaces(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    namespaces(&state, &cluster, q.refresh).await
}

pub async fn handle_nodes(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    nodes(&state, &cluster, q.refresh).await
}

pub async fn handle_info(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> Result<Json<ClusterInfo>, ApiError> {
    cluster_info(&state, &cluster).await
}

pub async fn handle_gateways(
    State(state): State<AppState>,
    Path((cluster, namespace)): Path<(String, String)>,
) -> Result<Json<Vec<Gateway>>, ApiError> {
    gateways(&state, &cluster, &namespace).await
}

// Single-cluster routes: the id is implicitly `default`.

pub async fn handle_default_overview(
    State(state): State<AppState>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    overview(&state, DEFAULT_CLUSTER, q.refresh).await
}

pub async fn handle_default_namespaces(
    State(state): State<AppState>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    namespaces(&state, DEFAULT_CLUSTER, q.refresh).await
}

pub async fn handle_default_nodes(
    State(state): State<AppState>,
    query: Result<Query<RefreshQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    nodes(&state, DEFAULT_CLUSTER, q.refresh).await
}

pub async fn handle_default_info(
    State(state): State<AppState>,
) -> Result<Json<ClusterInfo>, ApiError> {
    cluster_info(&state, DEFAULT_CLUSTER).await
}

pub async fn handle_default_gateways(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<Vec<Gateway>>, ApiError> {
    gateways(&state, DEFAULT_CLUSTER, &namespace).await
}
