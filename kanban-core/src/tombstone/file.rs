//! File-backed durable tombstone store.
//!
//! One `kanban-deleted-cards-<boardId>.json` file per board in a shared
//! directory. Writes are atomic (write to .tmp, fsync, rename). With the
//! `file-watcher` feature, changes made by other processes sharing the
//! directory are delivered through `subscribe`.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::{decode_ids, encode_ids, storage_key, TombstoneChange, TombstoneStore, TombstoneStoreError};
use crate::watcher::self_write::SelfWriteTracker;

pub struct FileTombstoneStore {
    dir: PathBuf,
    self_writes: Arc<Mutex<SelfWriteTracker>>,
    tx: broadcast::Sender<TombstoneChange>,
    #[cfg(feature = "file-watcher")]
    _watcher: Option<crate::watcher::file_watcher::TombstoneWatcher>,
}

impl FileTombstoneStore {
    /// Open (creating if needed) a tombstone directory and start watching it.
    /// A watcher that fails to start is logged; the store still works, it
    /// just won't hear about other processes.
    pub fn open(dir: &Path) -> Result<Self, TombstoneStoreError> {
        fs::create_dir_all(dir)?;
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let self_writes = Arc::new(Mutex::new(SelfWriteTracker::new()));
        let (tx, _) = broadcast::channel(64);

        #[cfg(feature = "file-watcher")]
        let watcher = match crate::watcher::file_watcher::TombstoneWatcher::start(
            &dir,
            self_writes.clone(),
            tx.clone(),
        ) {
            Ok(w) => Some(w),
            Err(e) => {
                log::warn!(
                    target: "kanban.tombstone",
                    "Cross-process tombstone sync disabled for {}: {}",
                    dir.display(),
                    e
                );
                None
            }
        };

        Ok(Self {
            dir,
            self_writes,
            tx,
            #[cfg(feature = "file-watcher")]
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, board_id: &str) -> Result<PathBuf, TombstoneStoreError> {
        if board_id.is_empty()
            || board_id.contains(['/', '\\'])
            || board_id.contains("..")
        {
            return Err(TombstoneStoreError::InvalidBoardId(board_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", storage_key(board_id))))
    }

    fn register_own(&self, path: &Path, content: Option<&str>) {
        self.self_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .register(path, content);
    }

    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl TombstoneStore for FileTombstoneStore {
    fn read(&self, board_id: &str) -> Result<Vec<String>, TombstoneStoreError> {
        let path = self.path_for(board_id)?;
        match fs::read_to_string(&path) {
            Ok(raw) => decode_ids(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, board_id: &str, ids: &[String]) -> Result<(), TombstoneStoreError> {
        let path = self.path_for(board_id)?;
        let content = encode_ids(ids)?;
        self.register_own(&path, Some(&content));
        Self::atomic_write(&path, &content)?;
        Ok(())
    }

    fn clear(&self, board_id: &str) -> Result<(), TombstoneStoreError> {
        let path = self.path_for(board_id)?;
        if !path.exists() {
            return Ok(());
        }
        self.register_own(&path, None);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TombstoneChange> {
        self.tx.subscribe()
    }
}
