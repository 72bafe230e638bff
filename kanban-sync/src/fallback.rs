//! Static, read-only board snapshots used when the live store is unreachable.
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kanban_core::types::Board;

pub trait FallbackSource: Send + Sync {
    /// Precompiled snapshot for a board, if one exists.
    fn load(&self, board_id: &str) -> Option<Board>;
}

/// Bounded least-recently-used cache of parsed snapshots.
#[derive(Debug)]
pub struct SnapshotCache {
    capacity: usize,
    /// Front is least recently used.
    entries: VecDeque<(String, Board)>,
}

impl SnapshotCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn get(&mut self, board_id: &str) -> Option<Board> {
        let pos = self.entries.iter().position(|(id, _)| id == board_id)?;
        let entry = self.entries.remove(pos)?;
        let board = entry.1.clone();
        self.entries.push_back(entry);
        Some(board)
    }

    /// Insert or replace, evicting the least recently used entry when full.
    pub fn put(&mut self, board_id: &str, board: Board) {
        self.entries.retain(|(id, _)| id != board_id);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((board_id.to_string(), board));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshots stored as `<dir>/<boardId>.json`.
pub struct DirectoryFallback {
    dir: PathBuf,
    cache: Mutex<SnapshotCache>,
}

impl DirectoryFallback {
    pub fn new(dir: &Path, cache_capacity: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            cache: Mutex::new(SnapshotCache::new(cache_capacity)),
        }
    }

    fn snapshot_path(&self, board_id: &str) -> Option<PathBuf> {
        if board_id.is_empty() || board_id.contains(['/', '\\']) || board_id.contains("..") {
            return None;
        }
        Some(self.dir.join(format!("{}.json", board_id)))
    }
}

impl FallbackSource for DirectoryFallback {
    fn load(&self, board_id: &str) -> Option<Board> {
        if let Some(board) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(board_id)
        {
            return Some(board);
        }

        let path = self.snapshot_path(board_id)?;
        let content = fs::read_to_string(&path).ok()?;
        let board: Board = match serde_json::from_str(&content) {
            Ok(board) => board,
            Err(e) => {
                log::warn!(
                    target: "kanban.fallback",
                    "Ignoring malformed snapshot {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(board_id, board.clone());
        Some(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache = SnapshotCache::new(2);
        cache.put("a", Board::new("a", "A"));
        cache.put("b", Board::new("b", "B"));
        assert!(cache.get("a").is_some());
        cache.put("c", Board::new("c", "C"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_cache_put_replaces() {
        let mut cache = SnapshotCache::new(2);
        cache.put("a", Board::new("a", "Old"));
        cache.put("a", Board::new("a", "New"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().title, "New");
    }

    #[test]
    fn test_directory_fallback_reads_and_caches() {
        let tmp = tempfile::tempdir().unwrap();
        let board = Board::new("work", "Work");
        fs::write(
            tmp.path().join("work.json"),
            serde_json::to_string(&board).unwrap(),
        )
        .unwrap();

        let fallback = DirectoryFallback::new(tmp.path(), 4);
        assert_eq!(fallback.load("work").unwrap().title, "Work");

        // served from cache once the file is gone
        fs::remove_file(tmp.path().join("work.json")).unwrap();
        assert!(fallback.load("work").is_some());
        assert!(fallback.load("missing").is_none());
        assert!(fallback.load("../etc/passwd").is_none());
    }

    #[test]
    fn test_directory_fallback_skips_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bad.json"), "not a board").unwrap();
        let fallback = DirectoryFallback::new(tmp.path(), 4);
        assert!(fallback.load("bad").is_none());
    }
}
