//! `kanban-store`: serve the reference board store.
//!
//! Usage: kanban-store [CONFIG_PATH]
use std::path::PathBuf;

use kanban_sync::config::{default_config_path, load_config};
use kanban_sync::logging;
use kanban_sync::store::{spawn_store, RemoteStore};

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    let store = RemoteStore::new(config.store_username.clone()).require_auth(config.require_auth);
    if let Some(dir) = &config.fallback_dir {
        match store.seed_from_dir(dir) {
            Ok(count) => log::info!(target: "kanban.store", "Seeded {} boards from {}", count, dir.display()),
            Err(e) => log::warn!(target: "kanban.store", "Could not seed from {}: {}", dir.display(), e),
        }
    }

    let addr = match spawn_store(store, &config.bind_address, config.port).await {
        Ok(addr) => addr,
        Err(e) => {
            log::error!(target: "kanban.store", "Failed to bind {}:{}: {}", config.bind_address, config.port, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!(target: "kanban.store", "Signal handler failed: {}", e);
    }
    log::info!(target: "kanban.store", "Shutting down store on {}", addr);
}
