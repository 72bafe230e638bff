//! The open board and everything that hangs off it.
//!
//! `BoardSession` ties the document, drag engine, tombstone tracker and
//! conflict monitor to the persistence client. Every load and save takes an
//! epoch ticket; a result whose ticket is stale by the time it arrives is
//! dropped without touching state.
use std::sync::{Arc, Mutex, MutexGuard};

use kanban_core::ids::{generate_card_id, generate_column_id};
use kanban_core::monitor::{ConflictMonitor, MonitorAction, MonitorEvent, MonitorState};
use kanban_core::notice::{conflict_key, save_failed_key, Notice, NoticeCenter};
use kanban_core::reorder::{DragEvent, ReorderEngine};
use kanban_core::tombstone::{TombstoneChange, TombstoneStore, TombstoneTracker};
use kanban_core::types::{now_timestamp, Board, Card, Column, ColumnPatch, VersionToken};
use kanban_core::{BoardDocument, Epoch, EpochGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::AuthGate;
use crate::client::SaveReply;
use crate::error::SyncError;
use crate::persistence::{LoadSource, PersistenceClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { source: LoadSource },
    /// A newer operation started while this one was in flight.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { new_head: VersionToken },
    /// The store moved on. Local edits and tombstones are kept.
    Conflict,
    Superseded,
}

struct SessionState {
    board_id: Option<String>,
    document: Option<BoardDocument>,
    /// Last board the store confirmed (loaded or accepted), for `discard`.
    pristine: Option<Board>,
    token: Option<VersionToken>,
    source: Option<LoadSource>,
    tombstones: TombstoneTracker,
    reorder: ReorderEngine,
    monitor: ConflictMonitor,
    /// Bumped by every local edit; lets a save tell whether the document
    /// changed while the request was in flight.
    revision: u64,
    saving: Option<Epoch>,
}

#[derive(Clone)]
pub struct BoardSession {
    state: Arc<Mutex<SessionState>>,
    persistence: Arc<PersistenceClient>,
    tombstone_store: Arc<dyn TombstoneStore>,
    epoch: EpochGuard,
    notices: NoticeCenter,
    actions: broadcast::Sender<MonitorAction>,
}

impl BoardSession {
    pub fn new(
        persistence: Arc<PersistenceClient>,
        tombstone_store: Arc<dyn TombstoneStore>,
        notices: NoticeCenter,
    ) -> Self {
        let (actions, _) = broadcast::channel(64);
        let state = SessionState {
            board_id: None,
            document: None,
            pristine: None,
            token: None,
            source: None,
            tombstones: TombstoneTracker::new("", tombstone_store.clone()),
            reorder: ReorderEngine::new(),
            monitor: ConflictMonitor::new(),
            revision: 0,
            saving: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            persistence,
            tombstone_store,
            epoch: EpochGuard::new(),
            notices,
            actions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- lifecycle ----

    /// Switch to `board_id`. Whatever was open is dropped immediately and
    /// any in-flight load or save for it is superseded.
    pub async fn open(&self, board_id: &str) -> Result<LoadOutcome, SyncError> {
        let epoch = self.epoch.begin();
        let stop_actions = {
            let mut state = self.lock();
            state.board_id = Some(board_id.to_string());
            state.document = None;
            state.pristine = None;
            state.token = None;
            state.source = None;
            state.saving = None;
            state.reorder = ReorderEngine::new();
            state.tombstones.switch_board(board_id);
            state.monitor.handle(MonitorEvent::Stop)
        };
        self.dispatch(Some(board_id), stop_actions);

        let loaded = self.persistence.load(board_id).await;

        let mut guard = self.lock();
        if !self.epoch.is_current(epoch) {
            log::debug!(target: "kanban.session", "Discarding stale load of {} (epoch {})", board_id, epoch.value());
            return Ok(LoadOutcome::Superseded);
        }
        let loaded = loaded?;
        let state = &mut *guard;
        state.tombstones.load(&loaded.board);
        state.pristine = Some(loaded.board.clone());
        state.document = Some(BoardDocument::new(loaded.board));
        state.token = loaded.token.clone();
        state.source = Some(loaded.source);
        state.revision += 1;
        let actions = state.monitor.handle(MonitorEvent::TokenAdopted(loaded.token));
        drop(guard);

        log::info!(
            target: "kanban.session",
            "Opened board {} ({:?})",
            board_id,
            loaded.source
        );
        self.dispatch(Some(board_id), actions);
        Ok(LoadOutcome::Applied {
            source: loaded.source,
        })
    }

    /// Replace local state with the store's current version, discarding
    /// unsaved edits and every tombstone. Resolves a conflict.
    pub async fn reload(&self) -> Result<LoadOutcome, SyncError> {
        let board_id = self.board_id().ok_or(SyncError::NoBoardOpen)?;
        let epoch = self.epoch.begin();

        let loaded = self.persistence.load(&board_id).await;

        let mut guard = self.lock();
        if !self.epoch.is_current(epoch) || guard.board_id.as_deref() != Some(board_id.as_str()) {
            log::debug!(target: "kanban.session", "Discarding stale reload of {} (epoch {})", board_id, epoch.value());
            return Ok(LoadOutcome::Superseded);
        }
        let loaded = loaded?;
        let state = &mut *guard;
        state.tombstones.clear();
        state.pristine = Some(loaded.board.clone());
        state.document = Some(BoardDocument::new(loaded.board));
        state.token = loaded.token.clone();
        state.source = Some(loaded.source);
        state.saving = None;
        state.reorder = ReorderEngine::new();
        state.revision += 1;
        let actions = state.monitor.handle(MonitorEvent::Reloaded(loaded.token));
        drop(guard);

        self.notices.dismiss(&conflict_key(&board_id));
        log::info!(target: "kanban.session", "Reloaded board {}", board_id);
        self.dispatch(Some(&board_id), actions);
        Ok(LoadOutcome::Applied {
            source: loaded.source,
        })
    }

    /// Submit the document, guarded by the held version token.
    pub async fn save(&self, auth: &AuthGate) -> Result<SaveOutcome, SyncError> {
        if !auth.can_save() {
            return Err(SyncError::NotAuthenticated);
        }

        let (epoch, board_id, board, token, submitted, revision) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let board_id = state.board_id.clone().ok_or(SyncError::NoBoardOpen)?;
            let board = state
                .document
                .as_ref()
                .map(|d| d.board().clone())
                .ok_or(SyncError::NoBoardOpen)?;
            if state.monitor.is_flagged() {
                log::debug!(target: "kanban.session", "Save of {} skipped: conflict pending", board_id);
                return Ok(SaveOutcome::Conflict);
            }
            if state.saving.is_some() {
                return Err(SyncError::SaveInProgress);
            }
            let token = state.token.clone().ok_or(SyncError::MissingVersionToken)?;
            let epoch = self.epoch.begin();
            state.saving = Some(epoch);
            (
                epoch,
                board_id,
                board,
                token,
                state.tombstones.ids().to_vec(),
                state.revision,
            )
        };

        let result = self
            .persistence
            .save(&board, &board_id, Some(&token), &submitted)
            .await;

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.saving == Some(epoch) {
            state.saving = None;
        }
        if !self.epoch.is_current(epoch) || state.board_id.as_deref() != Some(board_id.as_str()) {
            log::debug!(
                target: "kanban.session",
                "Discarding stale save result for {} (epoch {})",
                board_id,
                epoch.value()
            );
            return Ok(SaveOutcome::Superseded);
        }

        match result {
            Ok(SaveReply::Accepted { new_head }) => {
                let saved_at = now_timestamp();
                let mut confirmed = board;
                confirmed.updated_at = saved_at.clone();
                for column in &mut confirmed.columns {
                    column.cards.retain(|c| !submitted.contains(&c.id));
                }
                state.pristine = Some(confirmed);
                if state.revision == revision {
                    if let Some(document) = state.document.as_mut() {
                        document.mark_saved(saved_at);
                    }
                    state.tombstones.clear();
                } else {
                    // Edited mid-save: stay dirty, keep deletions made since.
                    state.tombstones.forget(&submitted);
                }
                state.token = Some(new_head.clone());
                let actions = state
                    .monitor
                    .handle(MonitorEvent::TokenAdopted(Some(new_head.clone())));
                drop(guard);
                self.notices.dismiss(&save_failed_key(&board_id));
                self.dispatch(Some(&board_id), actions);
                Ok(SaveOutcome::Saved { new_head })
            }
            Ok(SaveReply::Conflict) => {
                let actions = state.monitor.handle(MonitorEvent::SaveConflict);
                drop(guard);
                self.dispatch(Some(&board_id), actions);
                Ok(SaveOutcome::Conflict)
            }
            Err(e) => {
                drop(guard);
                log::warn!(target: "kanban.session", "Save of {} failed: {}", board_id, e);
                if e.is_retryable() {
                    self.notices.show(Notice::transient(
                        &board_id,
                        format!("Saving failed: {}. Your changes are kept.", e),
                    ));
                }
                Err(e)
            }
        }
    }

    /// Stop monitoring and forget the open board.
    pub fn close(&self) {
        self.epoch.invalidate();
        let (board_id, actions) = {
            let mut state = self.lock();
            let actions = state.monitor.handle(MonitorEvent::Stop);
            state.document = None;
            state.pristine = None;
            state.token = None;
            state.source = None;
            state.saving = None;
            state.reorder = ReorderEngine::new();
            state.tombstones.switch_board("");
            (state.board_id.take(), actions)
        };
        self.dispatch(board_id.as_deref(), actions);
    }

    /// Throw away local edits: restore the last board the store confirmed
    /// and drop every tombstone. A pending conflict stays flagged; only
    /// `reload` resolves it.
    pub fn discard(&self) -> Result<(), SyncError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let pristine = state.pristine.clone().ok_or(SyncError::NoBoardOpen)?;
        let document = state.document.as_mut().ok_or(SyncError::NoBoardOpen)?;
        document.discard_changes(pristine);
        state.tombstones.clear();
        state.reorder = ReorderEngine::new();
        state.revision += 1;
        log::info!(
            target: "kanban.session",
            "Discarded local changes to {}",
            state.board_id.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    // ---- edits ----

    fn edit<R>(&self, apply: impl FnOnce(&mut BoardDocument, &mut TombstoneTracker) -> R) -> Result<R, SyncError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let document = state.document.as_mut().ok_or(SyncError::NoBoardOpen)?;
        let result = apply(document, &mut state.tombstones);
        state.revision += 1;
        Ok(result)
    }

    pub fn add_card(&self, column_id: &str, card: Card) -> Result<(), SyncError> {
        self.edit(|doc, _| doc.add_card(column_id, card))
    }

    /// Append a new card with a generated id to `column_id`. Returns the id.
    pub fn create_card(&self, column_id: &str, title: &str) -> Result<String, SyncError> {
        let id = generate_card_id();
        self.add_card(column_id, Card::new(&id, title))?;
        Ok(id)
    }

    pub fn update_card(&self, card: Card) -> Result<(), SyncError> {
        self.edit(|doc, _| doc.update_card(card))
    }

    pub fn remove_card(&self, card_id: &str) -> Result<(), SyncError> {
        self.edit(|doc, tombstones| {
            if let Some(removed) = doc.remove_card(card_id) {
                tombstones.mark_deleted(&removed);
            }
        })
    }

    pub fn add_column(&self, column: Column) -> Result<(), SyncError> {
        self.edit(|doc, _| doc.add_column(column))
    }

    pub fn create_column(&self, title: &str) -> Result<String, SyncError> {
        let id = generate_column_id();
        self.add_column(Column::new(&id, title))?;
        Ok(id)
    }

    pub fn update_column(&self, column_id: &str, patch: ColumnPatch) -> Result<(), SyncError> {
        self.edit(|doc, _| doc.update_column(column_id, patch))
    }

    /// Removes the column and tombstones every card it held.
    pub fn remove_column(&self, column_id: &str) -> Result<Vec<String>, SyncError> {
        self.edit(|doc, tombstones| {
            let removed = doc.remove_column(column_id);
            for id in &removed {
                tombstones.mark_deleted(id);
            }
            removed
        })
    }

    pub fn move_card(&self, card_id: &str, from: &str, to: &str, to_index: usize) -> Result<(), SyncError> {
        self.edit(|doc, _| doc.move_card(card_id, from, to, to_index))
    }

    /// Feed a drag gesture event. Returns whether the board changed.
    pub fn drag(&self, event: DragEvent) -> Result<bool, SyncError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let document = state.document.as_mut().ok_or(SyncError::NoBoardOpen)?;
        match state.reorder.handle(document.board(), event) {
            Some(next) => {
                document.commit(next);
                state.revision += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- conflict monitor ----

    /// Run an event through the monitor. `Notify` raises the conflict notice
    /// here; the other actions go to `subscribe_actions` listeners.
    pub fn monitor_event(&self, event: MonitorEvent) -> Vec<MonitorAction> {
        let (board_id, actions) = {
            let mut state = self.lock();
            // Our own save moves the head; don't mistake that for a conflict.
            if matches!(event, MonitorEvent::RemoteHead { .. }) && state.saving.is_some() {
                return Vec::new();
            }
            let actions = state.monitor.handle(event);
            (state.board_id.clone(), actions)
        };
        self.dispatch(board_id.as_deref(), actions.clone());
        actions
    }

    /// Fetch the remote head for the held token. Failures come back as a
    /// `RemoteHead` with no remote value, which the monitor ignores.
    pub async fn poll_head(&self) -> Option<MonitorEvent> {
        let (board_id, compared_to) = {
            let state = self.lock();
            (state.board_id.clone()?, state.monitor.held_token()?.clone())
        };
        let remote = match self.persistence.store().fetch_head(&board_id).await {
            Ok(head) => Some(head),
            Err(e) => {
                log::debug!(target: "kanban.monitor", "Head poll for {} failed: {}", board_id, e);
                None
            }
        };
        Some(MonitorEvent::RemoteHead {
            compared_to,
            remote,
        })
    }

    pub fn set_visible(&self, visible: bool) -> Vec<MonitorAction> {
        self.monitor_event(MonitorEvent::VisibilityChanged { visible })
    }

    /// Timer and poll actions emitted by the monitor.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<MonitorAction> {
        self.actions.subscribe()
    }

    fn dispatch(&self, board_id: Option<&str>, actions: Vec<MonitorAction>) {
        for action in actions {
            match action {
                MonitorAction::Notify => {
                    if let Some(board_id) = board_id {
                        log::warn!(target: "kanban.monitor", "Board {} changed remotely", board_id);
                        self.notices.show(Notice::conflict(board_id));
                    }
                }
                other => {
                    let _ = self.actions.send(other);
                }
            }
        }
    }

    // ---- tombstone sync ----

    /// Adopt a tombstone change written by another tab.
    pub fn apply_tombstone_change(&self, change: &TombstoneChange) -> bool {
        self.lock().tombstones.apply_change(change)
    }

    /// Follow the durable store for changes made by other tabs.
    pub fn spawn_tombstone_sync(&self) -> JoinHandle<()> {
        let session = self.clone();
        let mut rx = self.tombstone_store.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        session.apply_tombstone_change(&change);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!(
                            target: "kanban.tombstone",
                            "Missed {} tombstone changes, re-reading store",
                            missed
                        );
                        session.resync_tombstones();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn resync_tombstones(&self) {
        let Some(board_id) = self.board_id() else {
            return;
        };
        match self.tombstone_store.read(&board_id) {
            Ok(ids) => {
                self.apply_tombstone_change(&TombstoneChange {
                    board_id,
                    ids: Some(ids),
                });
            }
            Err(e) => log::warn!(
                target: "kanban.tombstone",
                "Tombstone resync for {} failed: {}",
                board_id,
                e
            ),
        }
    }

    // ---- accessors ----

    pub fn board_id(&self) -> Option<String> {
        self.lock().board_id.clone()
    }

    pub fn board(&self) -> Option<Board> {
        self.lock().document.as_ref().map(|d| d.board().clone())
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().document.as_ref().is_some_and(|d| d.is_dirty())
    }

    pub fn token(&self) -> Option<VersionToken> {
        self.lock().token.clone()
    }

    pub fn load_source(&self) -> Option<LoadSource> {
        self.lock().source
    }

    pub fn tombstones(&self) -> Vec<String> {
        self.lock().tombstones.ids().to_vec()
    }

    pub fn monitor_state(&self) -> MonitorState {
        self.lock().monitor.state()
    }

    pub fn is_flagged(&self) -> bool {
        self.lock().monitor.is_flagged()
    }

    pub fn is_saving(&self) -> bool {
        self.lock().saving.is_some()
    }

    pub fn notices(&self) -> &NoticeCenter {
        &self.notices
    }

    pub fn epoch(&self) -> &EpochGuard {
        &self.epoch
    }
}
