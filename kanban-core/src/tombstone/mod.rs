//! Tombstone tracking for locally deleted cards.
//!
//! The save protocol sends deletions as an explicit id list, so every card
//! removed before a save is recorded here and in a durable per-board store.
//! Other tabs (or processes) sharing the durable store learn about changes
//! through `TombstoneStore::subscribe` and apply them with
//! `TombstoneTracker::apply_change`.

pub mod file;
pub mod memory;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::Board;

/// Durable key for a board's tombstones.
pub fn storage_key(board_id: &str) -> String {
    format!("kanban-deleted-cards-{}", board_id)
}

/// Inverse of `storage_key`.
pub fn board_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix("kanban-deleted-cards-")
        .filter(|id| !id.is_empty())
}

/// A change made to the durable store by another handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneChange {
    pub board_id: String,
    /// New contents, or `None` when the key was removed.
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum TombstoneStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed tombstone list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Board id not usable as a storage key: {0}")]
    InvalidBoardId(String),
}

/// Durable per-board storage for tombstones. Values are JSON-encoded ordered
/// lists of card ids; an absent key reads as an empty list.
pub trait TombstoneStore: Send + Sync {
    fn read(&self, board_id: &str) -> Result<Vec<String>, TombstoneStoreError>;

    fn write(&self, board_id: &str, ids: &[String]) -> Result<(), TombstoneStoreError>;

    fn clear(&self, board_id: &str) -> Result<(), TombstoneStoreError>;

    /// Changes written through *other* handles. A handle never observes its
    /// own writes.
    fn subscribe(&self) -> broadcast::Receiver<TombstoneChange>;
}

pub(crate) fn encode_ids(ids: &[String]) -> Result<String, TombstoneStoreError> {
    Ok(serde_json::to_string(ids)?)
}

pub(crate) fn decode_ids(raw: &str) -> Result<Vec<String>, TombstoneStoreError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = serde_json::from_str(raw)?;
    Ok(dedup_ordered(ids))
}

fn dedup_ordered(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// In-memory tombstone set for the open board, mirrored to a durable store.
pub struct TombstoneTracker {
    board_id: String,
    ids: Vec<String>,
    store: Arc<dyn TombstoneStore>,
}

impl TombstoneTracker {
    pub fn new(board_id: impl Into<String>, store: Arc<dyn TombstoneStore>) -> Self {
        Self {
            board_id: board_id.into(),
            ids: Vec::new(),
            store,
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.ids.iter().any(|id| id == card_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn store(&self) -> &Arc<dyn TombstoneStore> {
        &self.store
    }

    /// Point the tracker at another board. The in-memory set is emptied; call
    /// `load` once that board's document is available.
    pub fn switch_board(&mut self, board_id: impl Into<String>) {
        self.board_id = board_id.into();
        self.ids.clear();
    }

    /// Read durable tombstones and keep only ids present in `board`. Stale
    /// entries are dropped from the durable store as well.
    pub fn load(&mut self, board: &Board) {
        let stored = match self.store.read(&self.board_id) {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!(
                    target: "kanban.tombstone",
                    "Failed to read tombstones for {}: {}",
                    self.board_id,
                    e
                );
                Vec::new()
            }
        };
        let total = stored.len();
        self.ids = stored
            .into_iter()
            .filter(|id| board.contains_card(id))
            .collect();

        if self.ids.len() != total {
            log::info!(
                target: "kanban.tombstone",
                "Pruned {} stale tombstones for board {}",
                total - self.ids.len(),
                self.board_id
            );
            self.persist();
        }
    }

    /// Record a local deletion.
    pub fn mark_deleted(&mut self, card_id: &str) {
        if self.contains(card_id) {
            return;
        }
        self.ids.push(card_id.to_string());
        self.persist();
    }

    /// Drop every tombstone, in memory and durably (after save or reload).
    pub fn clear(&mut self) {
        self.ids.clear();
        if let Err(e) = self.store.clear(&self.board_id) {
            log::warn!(
                target: "kanban.tombstone",
                "Failed to clear tombstones for {}: {}",
                self.board_id,
                e
            );
        }
    }

    /// Drop specific ids, e.g. the ones a save confirmed while newer
    /// deletions were recorded mid-flight.
    pub fn forget(&mut self, card_ids: &[String]) {
        let before = self.ids.len();
        self.ids.retain(|id| !card_ids.contains(id));
        if self.ids.len() != before {
            self.persist();
        }
    }

    /// Apply a change observed from another tab. Returns whether the set
    /// changed.
    pub fn apply_change(&mut self, change: &TombstoneChange) -> bool {
        if change.board_id != self.board_id {
            return false;
        }
        let next = match &change.ids {
            Some(ids) => dedup_ordered(ids.clone()),
            None => Vec::new(),
        };
        if next == self.ids {
            return false;
        }
        log::debug!(
            target: "kanban.tombstone",
            "Adopting {} tombstones from another tab for {}",
            next.len(),
            self.board_id
        );
        self.ids = next;
        true
    }

    fn persist(&self) {
        let result = if self.ids.is_empty() {
            self.store.clear(&self.board_id)
        } else {
            self.store.write(&self.board_id, &self.ids)
        };
        if let Err(e) = result {
            log::warn!(
                target: "kanban.tombstone",
                "Failed to persist tombstones for {}: {}",
                self.board_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTombstoneHub;
    use super::*;
    use crate::types::{Card, Column};

    fn board_with(ids: &[&str]) -> Board {
        let mut board = Board::new("b1", "Work");
        let mut col = Column::new("todo", "Todo");
        for id in ids {
            col.cards.push(Card::new(*id, *id));
        }
        board.columns.push(col);
        board
    }

    #[test]
    fn test_storage_key_round_trip() {
        assert_eq!(storage_key("work"), "kanban-deleted-cards-work");
        assert_eq!(board_id_from_key("kanban-deleted-cards-work"), Some("work"));
        assert_eq!(board_id_from_key("kanban-deleted-cards-"), None);
        assert_eq!(board_id_from_key("other"), None);
    }

    #[test]
    fn test_decode_dedups_and_accepts_empty() {
        assert!(decode_ids("").unwrap().is_empty());
        assert_eq!(
            decode_ids(r#"["a","b","a"]"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(decode_ids("{not json").is_err());
    }

    #[test]
    fn test_mark_deleted_persists_in_order() {
        let hub = MemoryTombstoneHub::new();
        let store = Arc::new(hub.handle());
        let mut tracker = TombstoneTracker::new("b1", store.clone());
        tracker.mark_deleted("c2");
        tracker.mark_deleted("c1");
        tracker.mark_deleted("c2");
        assert_eq!(tracker.ids(), &["c2".to_string(), "c1".to_string()]);
        assert_eq!(store.read("b1").unwrap(), vec!["c2", "c1"]);
    }

    #[test]
    fn test_load_prunes_ids_missing_from_board() {
        let hub = MemoryTombstoneHub::new();
        let store = Arc::new(hub.handle());
        store
            .write("b1", &["c1".to_string(), "gone".to_string()])
            .unwrap();

        let mut tracker = TombstoneTracker::new("b1", store.clone());
        tracker.load(&board_with(&["c1", "c2"]));
        assert_eq!(tracker.ids(), &["c1".to_string()]);
        assert!(!tracker.contains("gone"));
        assert_eq!(store.read("b1").unwrap(), vec!["c1"]);
    }

    #[test]
    fn test_clear_empties_store() {
        let hub = MemoryTombstoneHub::new();
        let store = Arc::new(hub.handle());
        let mut tracker = TombstoneTracker::new("b1", store.clone());
        tracker.mark_deleted("c1");
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(store.read("b1").unwrap().is_empty());
    }

    #[test]
    fn test_forget_keeps_newer_deletions() {
        let hub = MemoryTombstoneHub::new();
        let store = Arc::new(hub.handle());
        let mut tracker = TombstoneTracker::new("b1", store.clone());
        tracker.mark_deleted("c1");
        tracker.mark_deleted("c2");
        tracker.forget(&["c1".to_string()]);
        assert_eq!(tracker.ids(), &["c2".to_string()]);
        assert_eq!(store.read("b1").unwrap(), vec!["c2"]);
        tracker.forget(&["c2".to_string()]);
        assert!(store.read("b1").unwrap().is_empty());
    }

    #[test]
    fn test_apply_change_scoped_to_board() {
        let hub = MemoryTombstoneHub::new();
        let mut tracker = TombstoneTracker::new("b1", Arc::new(hub.handle()));
        let other = TombstoneChange {
            board_id: "b2".into(),
            ids: Some(vec!["x".into()]),
        };
        assert!(!tracker.apply_change(&other));

        let added = TombstoneChange {
            board_id: "b1".into(),
            ids: Some(vec!["c1".into(), "c2".into()]),
        };
        assert!(tracker.apply_change(&added));
        assert_eq!(tracker.ids().len(), 2);
        assert!(!tracker.apply_change(&added));

        let cleared = TombstoneChange {
            board_id: "b1".into(),
            ids: None,
        };
        assert!(tracker.apply_change(&cleared));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cross_tab_propagation() {
        let hub = MemoryTombstoneHub::new();
        let store_a = Arc::new(hub.handle());
        let store_b = Arc::new(hub.handle());
        let mut rx_b = store_b.subscribe();
        let mut rx_a = store_a.subscribe();

        let mut tab_a = TombstoneTracker::new("b1", store_a);
        let mut tab_b = TombstoneTracker::new("b1", store_b);

        tab_a.mark_deleted("c1");
        let change = rx_b.try_recv().unwrap();
        assert!(tab_b.apply_change(&change));
        assert!(tab_b.contains("c1"));

        tab_a.clear();
        let change = rx_b.try_recv().unwrap();
        assert!(tab_b.apply_change(&change));
        assert!(tab_b.is_empty());

        // a tab never hears its own writes
        assert!(rx_a.try_recv().is_err());
    }
}
