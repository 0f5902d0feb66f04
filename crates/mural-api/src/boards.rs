use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::error;
use uuid::Uuid;

use mural_engine::BoardSpec;
use mural_types::api::{
    BoardResponse, CellResponse, Claims, ContributorResponse, CreateBoardRequest,
};
use mural_types::events::BoardEvent;

use crate::AppState;
use crate::error::ApiError;

pub async fn create_board(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let spec = BoardSpec {
        name: req.name,
        width: req.width,
        height: req.height,
        duration_minutes: req.duration_minutes,
        allow_redraw: req.allow_redraw,
        allow_after_close_viewing: req.allow_after_close_viewing,
        cooldown_seconds: req.cooldown_seconds,
        creator_id: claims.sub,
    };

    // Run blocking DB work off the async runtime
    let app = state.clone();
    let board = tokio::task::spawn_blocking(move || app.registry.create(spec, now))
        .await
        .map_err(join_error)??;

    Ok((StatusCode::CREATED, Json(BoardResponse::from_board(&board, now))))
}

pub async fn list_boards(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let app = state.clone();
    let boards = tokio::task::spawn_blocking(move || app.registry.list())
        .await
        .map_err(join_error)??;

    let responses: Vec<BoardResponse> = boards
        .iter()
        .map(|b| BoardResponse::from_board(b, now))
        .collect();
    Ok(Json(responses))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let app = state.clone();
    let board = tokio::task::spawn_blocking(move || app.registry.get(board_id))
        .await
        .map_err(join_error)??;
    Ok(Json(BoardResponse::from_board(&board, now)))
}

/// Explicit close. Only the creator may close a board early; closing an
/// already-closed board is a no-op and still returns 200.
pub async fn close_board(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();

    let app = state.clone();
    let board = tokio::task::spawn_blocking(move || app.registry.get(board_id))
        .await
        .map_err(join_error)??;
    if board.creator_id != claims.sub {
        return Err(ApiError::Forbidden("only the creator can close a board"));
    }

    let was_open = board.is_open_for_writes(now);
    let app = state.clone();
    let board = tokio::task::spawn_blocking(move || app.registry.close(board_id, now))
        .await
        .map_err(join_error)??;

    // Announce the transition once, on the actual close.
    if was_open {
        state.dispatcher.publish(&BoardEvent::BoardClosed {
            board_id,
            closed_at: now,
        });
    }

    Ok(Json(BoardResponse::from_board(&board, now)))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.clone();
    let cells = tokio::task::spawn_blocking(move || app.engine.snapshot(board_id))
        .await
        .map_err(join_error)??;

    let responses: Vec<CellResponse> = cells.into_iter().map(CellResponse::from).collect();
    Ok(Json(responses))
}

pub async fn list_contributors(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.clone();
    let contributors = tokio::task::spawn_blocking(move || app.engine.contributors(board_id))
        .await
        .map_err(join_error)??;

    let responses: Vec<ContributorResponse> =
        contributors.into_iter().map(ContributorResponse::from).collect();
    Ok(Json(responses))
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::from(anyhow::anyhow!("blocking task failed: {}", e))
}
