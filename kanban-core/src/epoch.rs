//! Operation epoch guard.
//!
//! Each async operation takes a ticket when it starts. Before applying its
//! result it must check that the ticket is still current; any later `begin`
//! or `invalidate` makes older tickets stale.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic generation counter shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct EpochGuard {
    current: Arc<AtomicU64>,
}

impl EpochGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new operation, superseding everything in flight.
    pub fn begin(&self) -> Epoch {
        Epoch(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Supersede in-flight operations without starting a new one
    /// (board switch, logout, teardown).
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> Epoch {
        Epoch(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }
}
