//! Persistence client: load from the live store (falling back to a static
//! snapshot) and submit guarded whole-document saves.
use std::sync::Arc;

use kanban_core::types::{Board, VersionToken};

use crate::client::{SaveReply, StoreClient};
use crate::error::SyncError;
use crate::fallback::FallbackSource;
use crate::protocol::SaveRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct LoadedBoard {
    pub board: Board,
    /// `None` for fallback loads: such a board cannot be saved.
    pub token: Option<VersionToken>,
    pub source: LoadSource,
}

pub struct PersistenceClient {
    store: StoreClient,
    fallback: Option<Arc<dyn FallbackSource>>,
}

impl PersistenceClient {
    pub fn new(store: StoreClient, fallback: Option<Arc<dyn FallbackSource>>) -> Self {
        Self { store, fallback }
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    /// Live store first; on any failure the static snapshot. `BoardNotFound`
    /// only when both come up empty.
    pub async fn load(&self, board_id: &str) -> Result<LoadedBoard, SyncError> {
        match self.store.fetch_board(board_id).await {
            Ok(resp) => {
                log::info!(
                    target: "kanban.persistence",
                    "Loaded board {} at head {}",
                    board_id,
                    resp.head_commit_sha
                );
                return Ok(LoadedBoard {
                    board: resp.board,
                    token: Some(VersionToken::new(resp.head_commit_sha)),
                    source: LoadSource::Live,
                });
            }
            Err(e) => {
                log::warn!(
                    target: "kanban.persistence",
                    "Live load of {} failed, trying static snapshot: {}",
                    board_id,
                    e
                );
            }
        }

        let snapshot = self.fallback.as_ref().and_then(|f| f.load(board_id));
        match snapshot {
            Some(board) => Ok(LoadedBoard {
                board,
                token: None,
                source: LoadSource::Fallback,
            }),
            None => Err(SyncError::BoardNotFound(board_id.to_string())),
        }
    }

    /// Submit the whole board plus explicit deletions, guarded by `token`.
    /// Without a token no request is made.
    pub async fn save(
        &self,
        board: &Board,
        board_id: &str,
        token: Option<&VersionToken>,
        tombstones: &[String],
    ) -> Result<SaveReply, SyncError> {
        let token = token.ok_or(SyncError::MissingVersionToken)?;
        let request = SaveRequest {
            board: board.clone(),
            board_id: board_id.to_string(),
            head_commit_sha: token.as_str().to_string(),
            deleted_card_ids: tombstones.to_vec(),
        };
        let reply = self.store.save(&request).await?;
        match &reply {
            SaveReply::Accepted { new_head } => log::info!(
                target: "kanban.persistence",
                "Saved board {}: {} -> {} ({} deletions)",
                board_id,
                token,
                new_head,
                tombstones.len()
            ),
            SaveReply::Conflict => log::warn!(
                target: "kanban.persistence",
                "Save of board {} rejected: head moved past {}",
                board_id,
                token
            ),
        }
        Ok(reply)
    }
}
