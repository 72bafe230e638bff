//! Kanban sync: the remote half of the board engine.
//!
//! `BoardSession` is the entry point for an editor; `store` is a reference
//! implementation of the remote board store it talks to.
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod monitor;
pub mod persistence;
pub mod protocol;
pub mod session;
pub mod store;

use std::sync::Arc;

use kanban_core::notice::NoticeCenter;
use kanban_core::tombstone::file::FileTombstoneStore;
use kanban_core::tombstone::memory::MemoryTombstoneHub;
use kanban_core::tombstone::TombstoneStore;

pub use auth::AuthGate;
pub use client::{SaveReply, StoreClient};
pub use config::SyncConfig;
pub use error::SyncError;
pub use persistence::{LoadSource, LoadedBoard, PersistenceClient};
pub use session::{BoardSession, LoadOutcome, SaveOutcome};

/// Build a session and auth gate from config. Both share one HTTP client,
/// so a login through the gate authenticates the session's saves.
pub fn connect(config: &SyncConfig, notices: NoticeCenter) -> Result<(BoardSession, AuthGate), SyncError> {
    let client = StoreClient::new(&config.store_url, config.request_timeout())?;

    let fallback: Option<Arc<dyn fallback::FallbackSource>> = config.fallback_dir.as_ref().map(|dir| {
        Arc::new(fallback::DirectoryFallback::new(dir, config.snapshot_cache_capacity))
            as Arc<dyn fallback::FallbackSource>
    });

    let tombstones: Arc<dyn TombstoneStore> = match &config.tombstone_dir {
        Some(dir) => Arc::new(FileTombstoneStore::open(dir)?),
        None => {
            log::info!(target: "kanban.tombstone", "No tombstone directory configured, keeping tombstones in memory");
            Arc::new(MemoryTombstoneHub::new().handle())
        }
    };

    let persistence = Arc::new(PersistenceClient::new(client.clone(), fallback));
    Ok((
        BoardSession::new(persistence, tombstones, notices),
        AuthGate::new(client),
    ))
}
