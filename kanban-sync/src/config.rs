//! Configuration for the sync client and the reference store.
//! Reads sync.json from ~/.config/kanban-sync/sync.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_store_url")]
    pub store_url: String,
    /// Directory of `<boardId>.json` static snapshots.
    #[serde(default)]
    pub fallback_dir: Option<PathBuf>,
    /// Directory for the durable tombstone store; in-memory when unset.
    #[serde(default)]
    pub tombstone_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_snapshot_cache_capacity")]
    pub snapshot_cache_capacity: usize,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name reported for sessions opened against the reference store.
    #[serde(default = "default_store_username")]
    pub store_username: String,
    /// When false the reference store accepts writes without a session.
    #[serde(default = "default_true")]
    pub require_auth: bool,
}

fn default_store_url() -> String {
    format!("http://{}:{}", default_bind_address(), default_port())
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_snapshot_cache_capacity() -> usize {
    8
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_store_username() -> String {
    "kanban".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            fallback_dir: None,
            tombstone_dir: None,
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            snapshot_cache_capacity: default_snapshot_cache_capacity(),
            bind_address: default_bind_address(),
            port: default_port(),
            store_username: default_store_username(),
            require_auth: true,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Default config path: ~/.config/kanban-sync/sync.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kanban-sync")
        .join("sync.json")
}

/// Load config from path. Returns defaults if the file is missing or invalid.
pub fn load_config(path: &Path) -> SyncConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(target: "kanban.config", "Failed to parse config {}: {}", path.display(), e);
            SyncConfig::default()
        }),
        Err(_) => {
            log::info!(target: "kanban.config", "No config at {}, using defaults", path.display());
            SyncConfig::default()
        }
    }
}
