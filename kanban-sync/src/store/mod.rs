//! In-memory reference implementation of the remote board store.
//!
//! Each board carries a head sha that advances on every accepted write.
//! Saves are compare-and-swap on that head. `commit_external` lets tests
//! (or an embedding agent) write without going through `/save`, the way an
//! automated agent commits straight to the backing repository.

mod routes;
mod server;

pub use routes::store_router;
pub use server::spawn_store;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use kanban_core::types::{now_timestamp, Board, BoardSummary};
use sha2::{Digest, Sha256};

use crate::protocol::SaveRequest;

/// Why a write was refused. Routes answer 404 for `NotFound` and 409 otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWriteError {
    NotFound,
    AlreadyExists,
    /// Submitted head is stale.
    Conflict { current_head: String },
}

#[derive(Debug, Clone)]
struct StoredBoard {
    board: Board,
    head: String,
}

#[derive(Debug, Default)]
struct StoreInner {
    boards: BTreeMap<String, StoredBoard>,
    sessions: HashSet<String>,
    session_counter: u64,
}

/// Shared handle; clones see the same boards and sessions.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    inner: Arc<Mutex<StoreInner>>,
    username: String,
    require_auth: bool,
}

impl RemoteStore {
    /// A store that requires a login session for writes.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            username: username.into(),
            require_auth: true,
        }
    }

    /// A store that accepts writes from anyone.
    pub fn open() -> Self {
        Self::new("anonymous").require_auth(false)
    }

    /// Toggle the login requirement for writes. Reads are always open.
    pub fn require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Name reported by `/auth/status` for logged-in sessions.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Seed or overwrite a board. Returns its new head.
    pub fn insert_board(&self, board: Board) -> String {
        let mut inner = self.lock();
        let prev = inner
            .boards
            .get(&board.id)
            .map(|b| b.head.clone())
            .unwrap_or_default();
        let head = next_head(&prev, &board);
        inner.boards.insert(
            board.id.clone(),
            StoredBoard {
                board,
                head: head.clone(),
            },
        );
        head
    }

    /// Seed from every `*.json` board file in `dir`. Unreadable files are
    /// skipped. Returns how many boards were loaded.
    pub fn seed_from_dir(&self, dir: &Path) -> Result<usize, std::io::Error> {
        let mut seeded = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Board>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(board) => {
                    log::info!(target: "kanban.store", "Seeded board {} from {}", board.id, path.display());
                    self.insert_board(board);
                    seeded += 1;
                }
                Err(e) => {
                    log::warn!(target: "kanban.store", "Skipping {}: {}", path.display(), e);
                }
            }
        }
        Ok(seeded)
    }

    /// The stored board and its head.
    pub fn board(&self, board_id: &str) -> Option<(Board, String)> {
        self.lock()
            .boards
            .get(board_id)
            .map(|b| (b.board.clone(), b.head.clone()))
    }

    pub fn head(&self, board_id: &str) -> Option<String> {
        self.lock().boards.get(board_id).map(|b| b.head.clone())
    }

    pub fn list(&self) -> Vec<BoardSummary> {
        self.lock()
            .boards
            .values()
            .map(|b| BoardSummary {
                id: b.board.id.clone(),
                title: b.board.title.clone(),
                card_count: b.board.card_count(),
            })
            .collect()
    }

    /// Create an empty board. Fails if the id is taken.
    pub fn create(&self, board_id: &str, title: &str) -> Result<String, StoreWriteError> {
        if self.lock().boards.contains_key(board_id) {
            return Err(StoreWriteError::AlreadyExists);
        }
        Ok(self.insert_board(Board::new(board_id, title)))
    }

    /// Compare-and-swap save. The submitted board replaces the stored one,
    /// minus any explicitly deleted cards; `updatedAt` is stamped here.
    pub fn save(&self, request: SaveRequest) -> Result<String, StoreWriteError> {
        let mut inner = self.lock();
        let stored = inner
            .boards
            .get_mut(&request.board_id)
            .ok_or(StoreWriteError::NotFound)?;
        if stored.head != request.head_commit_sha {
            return Err(StoreWriteError::Conflict {
                current_head: stored.head.clone(),
            });
        }

        let mut board = request.board;
        board.id = request.board_id.clone();
        for column in &mut board.columns {
            column
                .cards
                .retain(|c| !request.deleted_card_ids.contains(&c.id));
        }
        board.updated_at = now_timestamp();

        let head = next_head(&stored.head, &board);
        stored.board = board;
        stored.head = head.clone();
        Ok(head)
    }

    /// Write directly, bypassing the CAS check. Returns the new head.
    pub fn commit_external(&self, board_id: &str, edit: impl FnOnce(&mut Board)) -> Option<String> {
        let mut inner = self.lock();
        let stored = inner.boards.get_mut(board_id)?;
        edit(&mut stored.board);
        stored.board.updated_at = now_timestamp();
        stored.head = next_head(&stored.head, &stored.board);
        Some(stored.head.clone())
    }

    /// Start a login session and return its opaque token (the cookie value).
    pub fn open_session(&self) -> String {
        let mut inner = self.lock();
        inner.session_counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(inner.session_counter.to_le_bytes());
        hasher.update(now_timestamp().as_bytes());
        let token = hex::encode(hasher.finalize());
        inner.sessions.insert(token.clone());
        token
    }

    pub fn close_session(&self, token: &str) {
        self.lock().sessions.remove(token);
    }

    pub fn is_authenticated(&self, session: Option<&str>) -> bool {
        session.is_some_and(|token| self.lock().sessions.contains(token))
    }

    /// Whether a write from this session is allowed.
    pub fn may_write(&self, session: Option<&str>) -> bool {
        !self.require_auth || self.is_authenticated(session)
    }
}

/// Commit-like head: sha256 over the previous head and the new content.
fn next_head(prev: &str, board: &Board) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(serde_json::to_vec(board).unwrap_or_default());
    hex::encode(&hasher.finalize()[..20])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_core::types::{Card, Column};

    fn seeded() -> (RemoteStore, String) {
        let store = RemoteStore::open();
        let mut board = Board::new("work", "Work");
        let mut col = Column::new("todo", "Todo");
        col.cards.push(Card::new("c1", "One"));
        col.cards.push(Card::new("c2", "Two"));
        board.columns.push(col);
        let head = store.insert_board(board);
        (store, head)
    }

    fn request(board: Board, head: &str, deleted: &[&str]) -> SaveRequest {
        SaveRequest {
            board_id: board.id.clone(),
            board,
            head_commit_sha: head.to_string(),
            deleted_card_ids: deleted.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_save_advances_head_and_applies_deletions() {
        let (store, head) = seeded();
        assert_eq!(head.len(), 40);
        let (board, _) = store.board("work").unwrap();
        let new_head = store.save(request(board, &head, &["c2"])).unwrap();
        assert_ne!(new_head, head);
        let (saved, current) = store.board("work").unwrap();
        assert_eq!(current, new_head);
        assert!(!saved.contains_card("c2"));
        assert!(saved.contains_card("c1"));
    }

    #[test]
    fn test_stale_head_conflicts() {
        let (store, head) = seeded();
        let external = store
            .commit_external("work", |b| b.title = "Renamed by agent".into())
            .unwrap();
        let (board, _) = store.board("work").unwrap();
        assert_eq!(
            store.save(request(board, &head, &[])),
            Err(StoreWriteError::Conflict {
                current_head: external
            })
        );
    }

    #[test]
    fn test_create_and_list() {
        let (store, _) = seeded();
        assert_eq!(store.create("work", "Again"), Err(StoreWriteError::AlreadyExists));
        store.create("home", "Home").unwrap();
        let list = store.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().find(|b| b.id == "work").unwrap().card_count, 2);
    }

    #[test]
    fn test_seed_from_dir_skips_bad_files() {
        let tmp = tempfile::tempdir().unwrap();
        let board = Board::new("home", "Home");
        fs::write(
            tmp.path().join("home.json"),
            serde_json::to_string(&board).unwrap(),
        )
        .unwrap();
        fs::write(tmp.path().join("broken.json"), "{").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let store = RemoteStore::open();
        assert_eq!(store.seed_from_dir(tmp.path()).unwrap(), 1);
        assert_eq!(store.board("home").unwrap().0.title, "Home");
    }

    #[test]
    fn test_sessions_gate_writes() {
        let store = RemoteStore::new("octo");
        assert!(!store.may_write(None));
        let token = store.open_session();
        assert!(store.may_write(Some(&token)));
        store.close_session(&token);
        assert!(!store.may_write(Some(&token)));
        assert!(RemoteStore::open().may_write(None));
    }
}
