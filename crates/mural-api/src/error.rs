use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use mural_engine::PlacementError;
use mural_types::api::ErrorResponse;

/// Request-layer error: engine outcomes mapped to status codes plus the two
/// rejections that belong to the caller layer itself.
#[derive(Debug)]
pub enum ApiError {
    Engine(PlacementError),
    Forbidden(&'static str),
    InvalidColor,
}

impl From<PlacementError> for ApiError {
    fn from(err: PlacementError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Engine(PlacementError::Storage(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after) = match &self {
            Self::Engine(e) => {
                let (status, code) = match e {
                    PlacementError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                    PlacementError::BoardClosed => (StatusCode::CONFLICT, "board_closed"),
                    PlacementError::OutOfBounds { .. } => (StatusCode::BAD_REQUEST, "out_of_bounds"),
                    PlacementError::RedrawForbidden => (StatusCode::CONFLICT, "redraw_forbidden"),
                    PlacementError::CooldownActive { .. } => {
                        (StatusCode::TOO_MANY_REQUESTS, "cooldown_active")
                    }
                    PlacementError::InvalidBoardSpec { .. } => {
                        (StatusCode::BAD_REQUEST, "invalid_board_spec")
                    }
                    PlacementError::Storage(inner) => {
                        error!("Storage failure: {:#}", inner);
                        (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
                    }
                };
                let retry_after = match e {
                    PlacementError::CooldownActive { retry_after_seconds } => {
                        Some(*retry_after_seconds)
                    }
                    _ => None,
                };
                (status, code, e.to_string(), retry_after)
            }
            Self::Forbidden(reason) => (
                StatusCode::FORBIDDEN,
                "forbidden",
                (*reason).to_string(),
                None,
            ),
            Self::InvalidColor => (
                StatusCode::BAD_REQUEST,
                "invalid_color",
                "color must be a #RRGGBB hex string".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            retry_after_seconds: retry_after,
        });

        match retry_after {
            Some(seconds) => {
                ((status, [(header::RETRY_AFTER, seconds.to_string())], body)).into_response()
            }
            None => (status, body).into_response(),
        }
    }
}
