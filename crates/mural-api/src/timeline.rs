use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use mural_types::api::{CellResponse, HistoryEntryResponse};

use crate::AppState;
use crate::boards::join_error;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Inclusive lower bound on entry timestamps.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StateAtQuery {
    pub at: DateTime<Utc>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.clone();
    let entries =
        tokio::task::spawn_blocking(move || app.history.range(board_id, query.from, query.to))
            .await
            .map_err(join_error)??;

    let responses: Vec<HistoryEntryResponse> =
        entries.into_iter().map(HistoryEntryResponse::from).collect();
    Ok(Json(responses))
}

/// Board state reconstructed from the log as of `?at=`. Used for audit and
/// playback; the live snapshot endpoint is the fast path for "now".
pub async fn get_state_at(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Query(query): Query<StateAtQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.clone();
    let cells = tokio::task::spawn_blocking(move || app.history.state_at(board_id, query.at))
        .await
        .map_err(join_error)??;

    let responses: Vec<CellResponse> = cells.into_iter().map(CellResponse::from).collect();
    Ok(Json(responses))
}
