//! Error types for discovery and reporting

use std::path::PathBuf;
use thiserror::Error;

/// Engine-level failures. These end the session.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to create mDNS daemon: {0}")]
    EngineInit(String),

    #[error("Failed to select interface '{interface}': {reason}")]
    Interface { interface: String, reason: String },

    #[error("Failed to browse for service type '{service_type}': {reason}")]
    Browse { service_type: String, reason: String },

    #[error("Discovery engine is closed")]
    Closed,

    #[error("Failed to shut down mDNS daemon: {0}")]
    Shutdown(String),
}

/// Per-record output failures. These skip the record, never the session.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write report file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
