use thiserror::Error;

/// Failures crossing the persistence boundary. Conflicts are not errors:
/// they come back as `SaveOutcome::Conflict`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Save refused: the board has no version token (loaded from static snapshot)")]
    MissingVersionToken,

    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Board already exists: {0}")]
    BoardExists(String),

    #[error("A save is already in flight")]
    SaveInProgress,

    #[error("No board is open")]
    NoBoardOpen,

    #[error("Store unavailable: {0}")]
    Transient(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Tombstone store error: {0}")]
    Tombstone(#[from] kanban_core::TombstoneStoreError),
}

impl SyncError {
    /// Whether the user can simply try again with local state intact.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transient(_) | SyncError::Http(_) | SyncError::SaveInProgress
        )
    }
}
