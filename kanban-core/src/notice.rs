//! User-facing notices, deduplicated by a stable key.
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    Conflict,
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeAction {
    Reload,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub key: String,
    pub kind: NoticeKind,
    pub message: String,
    /// Persistent notices stay until dismissed or resolved.
    pub persistent: bool,
    pub action: Option<NoticeAction>,
}

impl Notice {
    /// The one conflict notice per board. Poll-detected and save-detected
    /// conflicts share the key so they never stack.
    pub fn conflict(board_id: &str) -> Self {
        Self {
            key: conflict_key(board_id),
            kind: NoticeKind::Conflict,
            message: "This board was changed elsewhere. Reload to get the latest version."
                .to_string(),
            persistent: true,
            action: Some(NoticeAction::Reload),
        }
    }

    pub fn transient(board_id: &str, message: impl Into<String>) -> Self {
        Self {
            key: save_failed_key(board_id),
            kind: NoticeKind::Transient,
            message: message.into(),
            persistent: false,
            action: Some(NoticeAction::Retry),
        }
    }
}

pub fn conflict_key(board_id: &str) -> String {
    format!("board-conflict-{}", board_id)
}

pub fn save_failed_key(board_id: &str) -> String {
    format!("board-save-failed-{}", board_id)
}

/// Active notices plus a broadcast feed for whatever renders them.
#[derive(Debug, Clone)]
pub struct NoticeCenter {
    active: Arc<Mutex<Vec<Notice>>>,
    tx: broadcast::Sender<Notice>,
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeCenter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            active: Arc::new(Mutex::new(Vec::new())),
            tx,
        }
    }

    /// Show a notice unless one with the same key is already active.
    /// Returns whether it was emitted.
    pub fn show(&self, notice: Notice) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.iter().any(|n| n.key == notice.key) {
            return false;
        }
        active.push(notice.clone());
        drop(active);
        let _ = self.tx.send(notice);
        true
    }

    pub fn dismiss(&self, key: &str) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|n| n.key != key);
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|n| n.key == key)
    }

    pub fn active(&self) -> Vec<Notice> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_shown_once() {
        let center = NoticeCenter::new();
        let mut rx = center.subscribe();
        assert!(center.show(Notice::conflict("b1")));
        assert!(!center.show(Notice::conflict("b1")));
        assert!(center.show(Notice::conflict("b2")));
        assert_eq!(rx.try_recv().unwrap().key, "board-conflict-b1");
        assert_eq!(rx.try_recv().unwrap().key, "board-conflict-b2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dismiss_allows_reshow() {
        let center = NoticeCenter::new();
        center.show(Notice::transient("b1", "Save failed"));
        assert!(center.is_active("board-save-failed-b1"));
        center.dismiss("board-save-failed-b1");
        assert!(center.active().is_empty());
        assert!(center.show(Notice::transient("b1", "Save failed again")));
    }

    #[test]
    fn test_conflict_notice_is_persistent_with_reload() {
        let notice = Notice::conflict("b1");
        assert!(notice.persistent);
        assert_eq!(notice.action, Some(NoticeAction::Reload));
        assert!(!Notice::transient("b1", "x").persistent);
    }
}
