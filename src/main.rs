mod cache;
mod clients;
mod config;
mod error;
mod helpers;
mod models;
mod quantity;
mod registry;
mod routes;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use clients::{CollectorSettings, KubeConnector};
use config::{Config, Mode};
use registry::ClusterRegistry;
use store::MemoryClusterStore;

#[derive(Parser, Debug)]
#[command(name = "cluster-stats")]
#[command(about = "Cached resource statistics for Kubernetes clusters")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file; defaults apply when it does not exist
    #[arg(
        long,
        env = "CLUSTER_STATS_CONFIG",
        default_value = "/etc/cluster-stats/config.yaml"
    )]
    config: PathBuf,

    /// Serve the local cluster (instant) or many configured clusters (server)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClusterRegistry>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cluster_stats=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        Config::load(&cli.config).unwrap_or_else(|e| {
            eprintln!("error loading config: {}", e);
            std::process::exit(1);
        })
    } else {
        info!("{} not found, using defaults", cli.config.display());
        Config::default()
    };
    if let Some(mode) = cli.mode {
        cfg.mode = mode;
    }
    if let Some(port) = cli.port {
        cfg.listen_port = port;
    }

    let clusters = cfg.initial_clusters().unwrap_or_else(|e| {
        eprintln!("error resolving clusters: {}", e);
        std::process::exit(1);
    });
    if clusters.is_empty() {
        warn!("no clusters configured; add them with POST /api/v1/clusters");
    }
    for c in &clusters {
        info!("cluster {} at {}", c.name, c.api_server);
    }

    let registry = ClusterRegistry::new(
        Arc::new(MemoryClusterStore::new(clusters)),
        Arc::new(KubeConnector {
            timeout: cfg.query_timeout(),
        }),
        CollectorSettings::from(&cfg),
    );

    let cfg = Arc::new(cfg);
    let state = AppState {
        registry: Arc::new(registry),
        config: cfg.clone(),
    };

    let router = routes::build_router(state);

    let listen_addr = cfg.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {}: {}", listen_addr, e);
        std::process::exit(1);
    });

    info!(
        "cluster-stats listening on {} ({:?} mode, cache ttl {}s)",
        listen_addr, cfg.mode, cfg.cache_ttl_secs
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            eprintln!("server error: {}", e);
            std::process::exit(1);
        });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
