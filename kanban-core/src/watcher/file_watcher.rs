//! Directory watcher for the file-backed tombstone store.
//!
//! Watches the tombstone directory with notify-debouncer-full and turns
//! writes made by other processes into `TombstoneChange` messages. Our own
//! writes are recognised by fingerprint and dropped.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use super::self_write::SelfWriteTracker;
use crate::tombstone::{board_id_from_key, decode_ids, TombstoneChange};

const DEBOUNCE_DURATION: Duration = Duration::from_millis(200);

/// Keeps the debouncer alive; dropping it stops the watch.
pub struct TombstoneWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
}

impl TombstoneWatcher {
    /// Watch `dir` (non-recursively). Changes not matched by `self_writes`
    /// are sent on `tx`.
    pub fn start(
        dir: &Path,
        self_writes: Arc<Mutex<SelfWriteTracker>>,
        tx: broadcast::Sender<TombstoneChange>,
    ) -> Result<Self, notify::Error> {
        let mut debouncer = new_debouncer(
            DEBOUNCE_DURATION,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => handle_debounced_events(&events, &self_writes, &tx),
                Err(errors) => {
                    for e in errors {
                        log::warn!(target: "kanban.tombstone.watcher", "Watch error: {}", e);
                    }
                }
            },
        )?;
        debouncer.watch(dir, RecursiveMode::NonRecursive)?;
        log::info!(
            target: "kanban.tombstone.watcher",
            "Watching tombstone directory {}",
            dir.display()
        );
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

fn handle_debounced_events(
    events: &[DebouncedEvent],
    self_writes: &Arc<Mutex<SelfWriteTracker>>,
    tx: &broadcast::Sender<TombstoneChange>,
) {
    // One read per path per batch: a rename produces several events.
    let paths: BTreeSet<&PathBuf> = events.iter().flat_map(|e| e.paths.iter()).collect();

    for path in paths {
        if board_id_for_path(path).is_none() {
            continue;
        }
        let content = match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!(
                    target: "kanban.tombstone.watcher",
                    "Failed to read {}: {}",
                    path.display(),
                    e
                );
                continue;
            }
        };

        let own = {
            let mut tracker = self_writes.lock().unwrap_or_else(|e| e.into_inner());
            tracker.cleanup_expired();
            tracker.has_pending(path) && tracker.check_and_consume(path, content.as_deref())
        };
        if own {
            continue;
        }

        if let Some(change) = change_for_path(path, content.as_deref()) {
            if tx.send(change).is_err() {
                log::debug!(target: "kanban.tombstone.watcher", "No subscribers for tombstone change");
            }
        }
    }
}

/// Board id encoded in a tombstone file name.
pub(crate) fn board_id_for_path(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    board_id_from_key(name.strip_suffix(".json")?)
}

/// Translate the observed state of a tombstone file into a change message.
/// Unparseable content is logged and skipped.
pub(crate) fn change_for_path(path: &Path, content: Option<&str>) -> Option<TombstoneChange> {
    let board_id = board_id_for_path(path)?.to_string();
    let ids = match content {
        None => None,
        Some(raw) => match decode_ids(raw) {
            Ok(ids) => Some(ids),
            Err(e) => {
                log::warn!(
                    target: "kanban.tombstone.watcher",
                    "Ignoring malformed tombstone file {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        },
    };
    Some(TombstoneChange { board_id, ids })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_id_for_path() {
        let path = Path::new("/data/kanban-deleted-cards-work.json");
        assert_eq!(board_id_for_path(path), Some("work"));
        assert_eq!(
            board_id_for_path(Path::new("/data/kanban-deleted-cards-work.json.tmp")),
            None
        );
        assert_eq!(board_id_for_path(Path::new("/data/notes.json")), None);
    }

    #[test]
    fn test_change_for_written_file() {
        let change = change_for_path(
            Path::new("/data/kanban-deleted-cards-work.json"),
            Some(r#"["c1","c2"]"#),
        )
        .unwrap();
        assert_eq!(change.board_id, "work");
        assert_eq!(change.ids, Some(vec!["c1".to_string(), "c2".to_string()]));
    }

    #[test]
    fn test_change_for_removed_file() {
        let change = change_for_path(Path::new("/data/kanban-deleted-cards-work.json"), None).unwrap();
        assert_eq!(change.ids, None);
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        assert!(change_for_path(Path::new("/data/kanban-deleted-cards-work.json"), Some("{oops")).is_none());
    }
}
