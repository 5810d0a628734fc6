use std::time::Duration;

use thiserror::Error;

/// Failures talking to a cluster API server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("GET {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("decoding {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid connection for cluster {cluster}: {reason}")]
    Connection { cluster: String, reason: String },

    #[error("{query} timed out after {}s", .after.as_secs_f64())]
    Timeout { query: String, after: Duration },
}

/// A collection pass that produced nothing usable.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("cluster {cluster} unreachable: all {queries} queries failed")]
    Unreachable { cluster: String, queries: usize },

    #[error("listing {what} in cluster {cluster}: {source}")]
    Listing {
        cluster: String,
        what: &'static str,
        #[source]
        source: ClientError,
    },
}

/// Why one namespace or node was left out of a detail listing.
#[derive(Debug, Error)]
pub enum DetailError {
    #[error("{kind} without a name")]
    MissingName { kind: &'static str },

    #[error("every query for namespace {0} failed")]
    NamespaceUnreadable(String),
}

/// Failures resolving a cluster id to a session.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cluster {0} not found")]
    NotFound(String),

    #[error("cluster {cluster} unavailable: {source}")]
    Unavailable {
        cluster: String,
        #[source]
        source: ClientError,
    },

    #[error("cluster store: {0}")]
    Store(String),
}
