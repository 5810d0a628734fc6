pub mod api;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Cluster connections
        .route(
            "/api/v1/clusters",
            get(api::handle_list_clusters).post(api::handle_upsert_cluster),
        )
        // Aggregated views
        .route(
            "/api/v1/clusters/{cluster}/overview",
            get(api::handle_overview),
        )
        .route(
            "/api/v1/clusters/{cluster}/namespaces",
            get(api::handle_namespaces),
        )
        .route("/api/v1/clusters/{cluster}/nodes", get(api::handle_nodes))
        .route("/api/v1/clusters/{cluster}/info", get(api::handle_info))
        .route(
            "/api/v1/clusters/{cluster}/namespaces/{namespace}/gateways",
            get(api::handle_gateways),
        )
        // Single-cluster shorthand for `default`
        .route("/api/v1/overview", get(api::handle_default_overview))
        .route("/api/v1/namespaces", get(api::handle_default_namespaces))
        .route("/api/v1/nodes", get(api::handle_default_nodes))
        .route("/api/v1/info", get(api::handle_default_info))
        .route(
            "/api/v1/namespaces/{namespace}/gateways",
            get(api::handle_default_gateways),
        )
        // Health
        .route("/healthz", get(api::handle_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
