//! HTTP client for the remote board store.
//!
//! Every request goes through one `reqwest::Client` with a cookie store, so
//! the session established by `/auth/login` rides along on every call.
use std::time::Duration;

use kanban_core::types::{BoardSummary, VersionToken};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;

use crate::error::SyncError;
use crate::protocol::{
    AuthStatus, BoardListResponse, BoardResponse, CreateBoardRequest, CreateBoardResponse,
    HeadResponse, SaveRequest, SaveResponse,
};

/// Path-segment encoding for board ids: keep unreserved characters readable.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Result of a save the store actually answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveReply {
    Accepted { new_head: VersionToken },
    /// The submitted head no longer matches the store's head.
    Conflict,
}

/// Cheap to clone; clones share the connection pool and cookie store.
#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl StoreClient {
    /// `base_url` is the store root, e.g. `http://127.0.0.1:8787`. A
    /// trailing slash is ignored. `timeout` applies per request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn board_url(&self, board_id: &str) -> String {
        self.url(&format!("/board/{}", utf8_percent_encode(board_id, SEGMENT)))
    }

    /// GET /board/{boardId}
    ///
    /// 404 maps to `BoardNotFound` so the caller can try a fallback. Any
    /// other failure is transient.
    pub async fn fetch_board(&self, board_id: &str) -> Result<BoardResponse, SyncError> {
        let resp = self
            .http
            .get(self.board_url(board_id))
            .send()
            .await
            .map_err(transient)?;
        match resp.status() {
            s if s.is_success() => Ok(resp.json().await.map_err(transient)?),
            StatusCode::NOT_FOUND => Err(SyncError::BoardNotFound(board_id.to_string())),
            s => Err(SyncError::Transient(format!(
                "GET board {} returned {}",
                board_id, s
            ))),
        }
    }

    /// Current head token for a board, reading only the head field.
    pub async fn fetch_head(&self, board_id: &str) -> Result<VersionToken, SyncError> {
        let resp = self
            .http
            .get(self.board_url(board_id))
            .send()
            .await
            .map_err(transient)?;
        if !resp.status().is_success() {
            return Err(SyncError::Transient(format!(
                "GET head {} returned {}",
                board_id,
                resp.status()
            )));
        }
        let head: HeadResponse = resp.json().await.map_err(transient)?;
        Ok(VersionToken::new(head.head_commit_sha))
    }

    /// GET /boards. Any failure yields an empty list.
    pub async fn list_boards(&self) -> Vec<BoardSummary> {
        let result = async {
            let resp = self.http.get(self.url("/boards")).send().await?;
            let resp = resp.error_for_status()?;
            resp.json::<BoardListResponse>().await
        }
        .await;
        match result {
            Ok(list) => list.boards,
            Err(e) => {
                log::warn!(target: "kanban.persistence", "Listing boards failed: {}", e);
                Vec::new()
            }
        }
    }

    /// POST /boards
    pub async fn create_board(&self, id: &str, title: &str) -> Result<String, SyncError> {
        let resp = self
            .http
            .post(self.url("/boards"))
            .json(&CreateBoardRequest {
                id: id.to_string(),
                title: title.to_string(),
            })
            .send()
            .await
            .map_err(transient)?;
        match resp.status() {
            s if s.is_success() => {
                let created: CreateBoardResponse = resp.json().await.map_err(transient)?;
                Ok(created.board_id)
            }
            StatusCode::CONFLICT => Err(SyncError::BoardExists(id.to_string())),
            StatusCode::UNAUTHORIZED => Err(SyncError::NotAuthenticated),
            s => Err(SyncError::Transient(format!("create board returned {}", s))),
        }
    }

    /// POST /save
    ///
    /// A 409 is an answer, not an error: it comes back as
    /// `SaveReply::Conflict`. A 2xx without a new head is treated as a
    /// failed save.
    pub async fn save(&self, request: &SaveRequest) -> Result<SaveReply, SyncError> {
        let resp = self
            .http
            .post(self.url("/save"))
            .json(request)
            .send()
            .await
            .map_err(transient)?;
        match resp.status() {
            s if s.is_success() => {
                let body: SaveResponse = resp.json().await.map_err(transient)?;
                match (body.success, body.new_head_sha) {
                    (true, Some(sha)) => Ok(SaveReply::Accepted {
                        new_head: VersionToken::new(sha),
                    }),
                    _ => Err(SyncError::Transient(
                        "store did not confirm the save".to_string(),
                    )),
                }
            }
            StatusCode::CONFLICT => Ok(SaveReply::Conflict),
            StatusCode::UNAUTHORIZED => Err(SyncError::NotAuthenticated),
            s => {
                let text = resp.text().await.unwrap_or_default();
                Err(SyncError::Transient(format!("save returned {}: {}", s, text)))
            }
        }
    }

    /// GET /auth/status. Any failure reads as unauthenticated.
    pub async fn auth_status(&self) -> AuthStatus {
        let result = async {
            let resp = self.http.get(self.url("/auth/status")).send().await?;
            resp.error_for_status()?.json::<AuthStatus>().await
        }
        .await;
        result.unwrap_or_else(|e| {
            log::debug!(target: "kanban.auth", "Auth status check failed: {}", e);
            AuthStatus::default()
        })
    }

    /// Where a browser should be sent to log in.
    pub fn login_url(&self) -> String {
        self.url("/auth/login")
    }

    /// GET /auth/login, following the redirect so the session cookie lands
    /// in the cookie store.
    pub async fn login(&self) -> Result<(), SyncError> {
        let resp = self
            .http
            .get(self.login_url())
            .send()
            .await
            .map_err(transient)?;
        if resp.status().is_server_error() {
            return Err(SyncError::Transient(format!("login returned {}", resp.status())));
        }
        Ok(())
    }

    /// POST /auth/logout
    pub async fn logout(&self) -> Result<(), SyncError> {
        let resp = self
            .http
            .post(self.url("/auth/logout"))
            .send()
            .await
            .map_err(transient)?;
        if !resp.status().is_success() {
            return Err(SyncError::Transient(format!("logout returned {}", resp.status())));
        }
        Ok(())
    }
}

fn transient(e: reqwest::Error) -> SyncError {
    SyncError::Transient(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_url_encoding() {
        let client = StoreClient::new("http://localhost:8787/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8787");
        assert_eq!(client.board_url("work-2024"), "http://localhost:8787/board/work-2024");
        assert_eq!(
            client.board_url("a b/c"),
            "http://localhost:8787/board/a%20b%2Fc"
        );
        assert_eq!(client.login_url(), "http://localhost:8787/auth/login");
    }
}
