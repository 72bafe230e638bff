//! Kanban board state model and the local half of the sync engine:
//! document operations, drag reordering, tombstones, the conflict monitor
//! transition table and the epoch guard.
pub mod document;
pub mod epoch;
pub mod ids;
pub mod monitor;
pub mod notice;
pub mod reorder;
pub mod tombstone;
pub mod types;
pub mod watcher;

pub use document::BoardDocument;
pub use epoch::{Epoch, EpochGuard};
pub use monitor::{ConflictMonitor, MonitorAction, MonitorEvent, MonitorState};
pub use notice::{Notice, NoticeAction, NoticeCenter, NoticeKind};
pub use reorder::{DragEvent, DropTarget, ReorderEngine};
pub use tombstone::{TombstoneChange, TombstoneStore, TombstoneStoreError, TombstoneTracker};
pub use types::{Board, BoardSummary, Card, CardChange, Column, ColumnPatch, VersionToken};
