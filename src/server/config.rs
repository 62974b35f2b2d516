//! Server configuration.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::server::error::Error;

/// How readiness is reported for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// One receive call per notification.
    Level,
    /// Drain the socket until it would block.
    #[default]
    Edge,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// Directory files are served from.
    pub doc_root: PathBuf,
    /// Readiness mode used for accepted connections.
    pub trigger_mode: TriggerMode,
    /// Number of event-loop threads.
    pub workers: usize,
    /// The maximum number of concurrent connections across all workers.
    pub max_connections: usize,
    /// Seconds a connection may stay idle before it is closed.
    pub idle_timeout_secs: u64,
    /// JSON object of username to password used to seed the user store.
    pub users_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 9006)),
            doc_root: PathBuf::from("./root"),
            trigger_mode: TriggerMode::Edge,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            max_connections: 65536,
            idle_timeout_secs: 15,
            users_file: None,
        }
    }
}

impl ServerConfig {
    /// Reads a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
