//! Own-write suppression for the durable tombstone directory.
//!
//! Every write (or removal) made through a store handle registers a SHA-256
//! fingerprint of the content it leaves behind. When the watcher reports a
//! change, the current content is fingerprinted: a match is our own write
//! and is consumed silently, anything else came from another process.
//! A removed file fingerprints as empty content.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

const FINGERPRINT_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn from_content(content: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        match content {
            Some(text) => {
                hasher.update(b"present:");
                hasher.update(text.trim().as_bytes());
            }
            None => hasher.update(b"absent"),
        }
        Self(hex::encode(hasher.finalize()))
    }
}

struct Pending {
    fingerprint: ContentFingerprint,
    registered_at: Instant,
}

#[derive(Default)]
pub struct SelfWriteTracker {
    /// path -> fingerprints of writes not yet seen by the watcher
    pending: HashMap<PathBuf, Vec<Pending>>,
}

impl SelfWriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the content a write is about to leave at `path`
    /// (`None` for a removal).
    pub fn register(&mut self, path: &Path, content: Option<&str>) {
        self.pending
            .entry(path.to_path_buf())
            .or_default()
            .push(Pending {
                fingerprint: ContentFingerprint::from_content(content),
                registered_at: Instant::now(),
            });
    }

    /// True when the observed content matches one of our pending writes.
    /// The match is consumed together with every older pending write for
    /// the path: those were overwritten before the watcher saw them.
    pub fn check_and_consume(&mut self, path: &Path, observed: Option<&str>) -> bool {
        let fingerprint = ContentFingerprint::from_content(observed);
        let Some(entries) = self.pending.get_mut(path) else {
            return false;
        };
        let Some(pos) = entries.iter().rposition(|e| e.fingerprint == fingerprint) else {
            return false;
        };
        entries.drain(..=pos);
        if entries.is_empty() {
            self.pending.remove(path);
        }
        true
    }

    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, entries| {
            entries.retain(|e| now.duration_since(e.registered_at) < FINGERPRINT_TTL);
            !entries.is_empty()
        });
    }

    /// Whether any write to `path` is still waiting to be observed.
    pub fn has_pending(&self, path: &Path) -> bool {
        self.pending.get(path).is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_write_is_consumed_once() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/kanban-deleted-cards-b1.json");
        tracker.register(path, Some(r#"["c1"]"#));
        assert!(tracker.check_and_consume(path, Some(r#"["c1"]"#)));
        assert!(!tracker.check_and_consume(path, Some(r#"["c1"]"#)));
    }

    #[test]
    fn test_foreign_content_passes_through() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/kanban-deleted-cards-b1.json");
        tracker.register(path, Some(r#"["c1"]"#));
        assert!(!tracker.check_and_consume(path, Some(r#"["c1","c2"]"#)));
        assert!(tracker.has_pending(path));
    }

    #[test]
    fn test_batched_writes_consume_superseded_fingerprints() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/kanban-deleted-cards-b1.json");
        tracker.register(path, Some(r#"["c1"]"#));
        tracker.register(path, Some(r#"["c1","c2"]"#));
        // the watcher only sees the final content of the batch
        assert!(tracker.check_and_consume(path, Some(r#"["c1","c2"]"#)));
        assert!(!tracker.has_pending(path));
        // another process writing the earlier content is not mistaken for us
        assert!(!tracker.check_and_consume(path, Some(r#"["c1"]"#)));
    }

    #[test]
    fn test_later_writes_stay_pending() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/kanban-deleted-cards-b1.json");
        tracker.register(path, Some(r#"["c1"]"#));
        tracker.register(path, None);
        assert!(tracker.check_and_consume(path, Some(r#"["c1"]"#)));
        assert!(tracker.has_pending(path));
        assert!(tracker.check_and_consume(path, None));
    }

    #[test]
    fn test_removal_fingerprint() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/kanban-deleted-cards-b1.json");
        tracker.register(path, None);
        assert!(!tracker.check_and_consume(path, Some("")));
        assert!(tracker.check_and_consume(path, None));
    }

    #[test]
    fn test_cleanup_expired() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/kanban-deleted-cards-b1.json");
        tracker.register(path, Some("[]"));
        if let Some(entries) = tracker.pending.get_mut(path) {
            entries[0].registered_at = Instant::now() - Duration::from_secs(15);
        }
        tracker.cleanup_expired();
        assert!(!tracker.has_pending(path));
    }
}
