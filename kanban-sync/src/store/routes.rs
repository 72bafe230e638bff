use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};

use super::{RemoteStore, StoreWriteError};
use crate::protocol::{
    AuthStatus, BoardListResponse, BoardResponse, CreateBoardRequest, CreateBoardResponse,
    ErrorResponse, SaveRequest, SaveResponse, ERROR_BOARD_EXISTS, ERROR_CONFLICT,
    ERROR_NOT_AUTHENTICATED, ERROR_NOT_FOUND, SESSION_COOKIE,
};

/// Store routes.
///
///   GET  /                 -> liveness text
///   GET  /board/{boardId}  -> board + head sha
///   GET  /boards           -> board summaries
///   POST /boards           -> create board
///   POST /save             -> CAS save
///   GET  /auth/status      -> session state
///   GET  /auth/login       -> open session, redirect to /
///   POST /auth/logout      -> close session
pub fn store_router(store: RemoteStore) -> Router {
    Router::new()
        .route("/", get(|| async { "kanban store" }))
        .route("/board/{board_id}", get(get_board))
        .route("/boards", get(list_boards).post(create_board))
        .route("/save", post(save_board))
        .route("/auth/status", get(auth_status))
        .route("/auth/login", get(login))
        .route("/auth/logout", post(logout))
        .with_state(store)
}

fn error(status: StatusCode, target: &'static str, code: &str, detail: impl AsRef<str>) -> Response {
    if status.is_server_error() {
        log::error!(target: target, "{}", detail.as_ref());
    } else {
        log::warn!(target: target, "{}", detail.as_ref());
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
        }),
    )
        .into_response()
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

async fn get_board(State(store): State<RemoteStore>, Path(board_id): Path<String>) -> Response {
    match store.board(&board_id) {
        Some((board, head)) => Json(BoardResponse {
            board,
            head_commit_sha: head,
        })
        .into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            "kanban.store.get_board",
            ERROR_NOT_FOUND,
            format!("Board not found: {}", board_id),
        ),
    }
}

async fn list_boards(State(store): State<RemoteStore>) -> Json<BoardListResponse> {
    Json(BoardListResponse {
        boards: store.list(),
    })
}

async fn create_board(
    State(store): State<RemoteStore>,
    headers: HeaderMap,
    Json(body): Json<CreateBoardRequest>,
) -> Response {
    if !store.may_write(session_token(&headers).as_deref()) {
        return error(
            StatusCode::UNAUTHORIZED,
            "kanban.store.create_board",
            ERROR_NOT_AUTHENTICATED,
            format!("Unauthenticated create of {}", body.id),
        );
    }
    match store.create(&body.id, &body.title) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(CreateBoardResponse { board_id: body.id }),
        )
            .into_response(),
        Err(_) => error(
            StatusCode::CONFLICT,
            "kanban.store.create_board",
            ERROR_BOARD_EXISTS,
            format!("Board already exists: {}", body.id),
        ),
    }
}

async fn save_board(
    State(store): State<RemoteStore>,
    headers: HeaderMap,
    Json(body): Json<SaveRequest>,
) -> Response {
    if !store.may_write(session_token(&headers).as_deref()) {
        return error(
            StatusCode::UNAUTHORIZED,
            "kanban.store.save",
            ERROR_NOT_AUTHENTICATED,
            format!("Unauthenticated save of {}", body.board_id),
        );
    }
    let board_id = body.board_id.clone();
    match store.save(body) {
        Ok(head) => {
            log::info!(target: "kanban.store.save", "Board {} now at {}", board_id, head);
            Json(SaveResponse {
                success: true,
                new_head_sha: Some(head),
            })
            .into_response()
        }
        Err(StoreWriteError::Conflict { current_head }) => error(
            StatusCode::CONFLICT,
            "kanban.store.save",
            ERROR_CONFLICT,
            format!("Stale save of {} (head is {})", board_id, current_head),
        ),
        Err(_) => error(
            StatusCode::NOT_FOUND,
            "kanban.store.save",
            ERROR_NOT_FOUND,
            format!("Save for unknown board {}", board_id),
        ),
    }
}

async fn auth_status(State(store): State<RemoteStore>, headers: HeaderMap) -> Json<AuthStatus> {
    let authenticated = store.is_authenticated(session_token(&headers).as_deref());
    Json(AuthStatus {
        authenticated,
        username: authenticated.then(|| store.username().to_string()),
    })
}

async fn login(State(store): State<RemoteStore>) -> impl IntoResponse {
    let token = store.open_session();
    log::info!(target: "kanban.store.auth", "Opened session for {}", store.username());
    (
        [(
            header::SET_COOKIE,
            format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token),
        )],
        Redirect::to("/"),
    )
}

async fn logout(State(store): State<RemoteStore>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        store.close_session(&token);
    }
    (
        [(
            header::SET_COOKIE,
            format!("{}=; Path=/; Max-Age=0", SESSION_COOKIE),
        )],
        Json(serde_json::json!({ "success": true })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; kanban_session=abc123; other=1"),
        );
        assert_eq!(session_token(&headers), Some("abc123".to_string()));
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
