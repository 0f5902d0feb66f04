use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use mural_engine::PlacementRequest;
use mural_types::api::{CellResponse, Claims, PlacePixelRequest};
use mural_types::models::normalize_color;

use crate::AppState;
use crate::boards::join_error;
use crate::error::ApiError;

/// The write path. Color shape is validated here, ahead of the engine;
/// actor identity comes from the verified claims, never the body.
pub async fn place_pixel(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PlacePixelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let color = normalize_color(&req.color).ok_or(ApiError::InvalidColor)?;

    let placement = PlacementRequest {
        board_id,
        x: req.x,
        y: req.y,
        color,
        actor_id: claims.sub,
        display_name: claims.display_name,
        now: Utc::now(),
    };

    // The engine is synchronous; run it off the async runtime.
    let app = state.clone();
    let cell = tokio::task::spawn_blocking(move || app.engine.place_pixel(placement))
        .await
        .map_err(join_error)??;

    Ok((StatusCode::CREATED, Json(CellResponse::from(cell))))
}
