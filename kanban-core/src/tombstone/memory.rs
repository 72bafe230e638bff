//! In-memory durable store shared by several handles.
//!
//! Each handle plays the role of one tab: values live in the shared hub and
//! every write is delivered to all *other* handles, the way storage events
//! reach other same-origin tabs but not the writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::{decode_ids, encode_ids, storage_key, TombstoneChange, TombstoneStore, TombstoneStoreError};

#[derive(Default)]
struct HubInner {
    /// storage key -> JSON value
    values: HashMap<String, String>,
    /// handle id -> that handle's change feed
    listeners: Vec<(u64, broadcast::Sender<TombstoneChange>)>,
}

#[derive(Clone, Default)]
pub struct MemoryTombstoneHub {
    inner: Arc<Mutex<HubInner>>,
    next_handle: Arc<AtomicU64>,
}

impl MemoryTombstoneHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new handle (one per tab).
    pub fn handle(&self) -> MemoryTombstoneStore {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = broadcast::channel(64);
        self.lock().listeners.push((id, tx.clone()));
        MemoryTombstoneStore {
            hub: self.clone(),
            handle_id: id,
            tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, from: u64, key: String, value: Option<String>, change: TombstoneChange) {
        let mut inner = self.lock();
        let unchanged = inner.values.get(&key) == value.as_ref();
        match value {
            Some(v) => {
                inner.values.insert(key, v);
            }
            None => {
                inner.values.remove(&key);
            }
        }
        if unchanged {
            return;
        }
        for (id, tx) in &inner.listeners {
            if *id != from {
                let _ = tx.send(change.clone());
            }
        }
    }
}

pub struct MemoryTombstoneStore {
    hub: MemoryTombstoneHub,
    handle_id: u64,
    tx: broadcast::Sender<TombstoneChange>,
}

impl TombstoneStore for MemoryTombstoneStore {
    fn read(&self, board_id: &str) -> Result<Vec<String>, TombstoneStoreError> {
        let raw = self.hub.lock().values.get(&storage_key(board_id)).cloned();
        match raw {
            Some(raw) => decode_ids(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn write(&self, board_id: &str, ids: &[String]) -> Result<(), TombstoneStoreError> {
        let value = encode_ids(ids)?;
        self.hub.set(
            self.handle_id,
            storage_key(board_id),
            Some(value),
            TombstoneChange {
                board_id: board_id.to_string(),
                ids: Some(ids.to_vec()),
            },
        );
        Ok(())
    }

    fn clear(&self, board_id: &str) -> Result<(), TombstoneStoreError> {
        self.hub.set(
            self.handle_id,
            storage_key(board_id),
            None,
            TombstoneChange {
                board_id: board_id.to_string(),
                ids: None,
            },
        );
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TombstoneChange> {
        self.tx.subscribe()
    }
}

impl Drop for MemoryTombstoneStore {
    fn drop(&mut self) {
        let id = self.handle_id;
        self.hub.lock().listeners.retain(|(h, _)| *h != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_key_reads_empty() {
        let hub = MemoryTombstoneHub::new();
        assert!(hub.handle().read("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_writes_visible_to_all_handles() {
        let hub = MemoryTombstoneHub::new();
        let a = hub.handle();
        let b = hub.handle();
        a.write("b1", &["c1".to_string()]).unwrap();
        assert_eq!(b.read("b1").unwrap(), vec!["c1"]);
    }

    #[test]
    fn test_unchanged_value_does_not_notify() {
        let hub = MemoryTombstoneHub::new();
        let a = hub.handle();
        let b = hub.handle();
        let mut rx = b.subscribe();
        a.clear("b1").unwrap();
        assert!(rx.try_recv().is_err());
        a.write("b1", &["c1".to_string()]).unwrap();
        a.write("b1", &["c1".to_string()]).unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_handle_unregisters() {
        let hub = MemoryTombstoneHub::new();
        let a = hub.handle();
        {
            let _b = hub.handle();
            assert_eq!(hub.lock().listeners.len(), 2);
        }
        assert_eq!(hub.lock().listeners.len(), 1);
        a.write("b1", &["c1".to_string()]).unwrap();
    }
}
