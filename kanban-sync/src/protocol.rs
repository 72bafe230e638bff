//! Wire types for the remote board store, shared by the client and the
//! reference store.
//!
//!   GET  /board/{boardId}  -> BoardResponse
//!   GET  /boards           -> BoardListResponse
//!   POST /boards           CreateBoardRequest -> CreateBoardResponse | 409 board_exists | 401
//!   POST /save             SaveRequest -> SaveResponse | 409 conflict
//!   GET  /auth/status      -> AuthStatus
//!   GET  /auth/login       -> redirect, establishes the session cookie
//!   POST /auth/logout      -> 2xx
use kanban_core::types::{Board, BoardSummary};
use serde::{Deserialize, Serialize};

pub const ERROR_BOARD_EXISTS: &str = "board_exists";
pub const ERROR_NOT_AUTHENTICATED: &str = "not_authenticated";
pub const ERROR_CONFLICT: &str = "conflict";
pub const ERROR_NOT_FOUND: &str = "not_found";

pub const SESSION_COOKIE: &str = "kanban_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    pub board: Board,
    pub head_commit_sha: String,
}

/// Head-only view of `GET /board/{boardId}`; the board body is skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadResponse {
    pub head_commit_sha: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardListResponse {
    #[serde(default)]
    pub boards: Vec<BoardSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBoardRequest {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoardResponse {
    pub board_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub board: Board,
    pub board_id: String,
    pub head_commit_sha: String,
    #[serde(default)]
    pub deleted_card_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub new_head_sha: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
