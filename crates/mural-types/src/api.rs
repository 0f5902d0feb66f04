use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Board, Cell, Contributor, HistoryEntry};

// -- JWT Claims --

/// JWT claims shared across mural-api (REST middleware) and mural-gateway
/// (WebSocket Identify). Canonical definition lives here in mural-types.
/// Token issuance belongs to the account service; mural only validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub display_name: String,
    pub exp: usize,
}

// -- Boards --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBoardRequest {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub duration_minutes: i64,
    #[serde(default = "default_true")]
    pub allow_redraw: bool,
    #[serde(default = "default_true")]
    pub allow_after_close_viewing: bool,
    #[serde(default)]
    pub cooldown_seconds: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub id: Uuid,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub open_for_writes: bool,
    pub allow_redraw: bool,
    pub allow_after_close_viewing: bool,
    pub cooldown_seconds: i64,
    pub creator_id: Uuid,
}

impl BoardResponse {
    pub fn from_board(board: &Board, now: DateTime<Utc>) -> Self {
        Self {
            id: board.id,
            name: board.name.clone(),
            width: board.width,
            height: board.height,
            created_at: board.created_at,
            closes_at: board.closes_at(),
            open_for_writes: board.is_open_for_writes(now),
            allow_redraw: board.allow_redraw,
            allow_after_close_viewing: board.allow_after_close_viewing,
            cooldown_seconds: board.cooldown_seconds,
            creator_id: board.creator_id,
        }
    }
}

// -- Pixels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacePixelRequest {
    pub x: u32,
    pub y: u32,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct CellResponse {
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: Uuid,
    pub modification_count: u64,
    pub distinct_editors: u64,
}

impl From<Cell> for CellResponse {
    fn from(cell: Cell) -> Self {
        Self {
            x: cell.x,
            y: cell.y,
            color: cell.color,
            last_modified_at: cell.last_modified_at,
            last_modified_by: cell.last_modified_by,
            modification_count: cell.modification_count,
            distinct_editors: cell.distinct_editors,
        }
    }
}

// -- History --

#[derive(Debug, Serialize)]
pub struct HistoryEntryResponse {
    pub seq: i64,
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub timestamp: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            seq: entry.seq,
            x: entry.x,
            y: entry.y,
            color: entry.color,
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            timestamp: entry.timestamp,
        }
    }
}

// -- Contributors --

#[derive(Debug, Serialize)]
pub struct ContributorResponse {
    pub actor_id: Uuid,
    pub display_name: String,
    pub pixels_count: u64,
    pub last_placement_at: DateTime<Utc>,
}

impl From<Contributor> for ContributorResponse {
    fn from(c: Contributor) -> Self {
        Self {
            actor_id: c.actor_id,
            display_name: c.display_name,
            pixels_count: c.pixels_count,
            last_placement_at: c.last_placement_at,
        }
    }
}

// -- Errors --

/// Uniform error body for rejected requests. `retry_after_seconds` is only
/// present on cooldown rejections.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i64>,
}
