use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use mural_db::Database;
use mural_db::time::fmt_ts;
use mural_types::models::Board;

use crate::error::PlacementError;

/// Policy maximum for either board dimension.
pub const MAX_BOARD_DIMENSION: u32 = 1000;

/// Everything a caller decides at creation time; identity and `created_at`
/// are assigned here.
#[derive(Debug, Clone)]
pub struct BoardSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub duration_minutes: i64,
    pub allow_redraw: bool,
    pub allow_after_close_viewing: bool,
    pub cooldown_seconds: i64,
    pub creator_id: Uuid,
}

/// Board metadata and lifecycle. Open/closed is always computed from `now`;
/// only an explicit close is ever persisted, and closed is terminal.
pub struct BoardRegistry {
    db: Arc<Database>,
}

impl BoardRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, spec: BoardSpec, now: DateTime<Utc>) -> Result<Board, PlacementError> {
        if spec.width == 0 || spec.height == 0 {
            return Err(PlacementError::InvalidBoardSpec {
                reason: "dimensions must be positive",
            });
        }
        if spec.width > MAX_BOARD_DIMENSION || spec.height > MAX_BOARD_DIMENSION {
            return Err(PlacementError::InvalidBoardSpec {
                reason: "dimensions exceed the policy maximum",
            });
        }
        // A non-positive duration would close the board at (or before) its
        // own creation instant.
        if spec.duration_minutes < 1 {
            return Err(PlacementError::InvalidBoardSpec {
                reason: "duration must be at least one minute",
            });
        }
        if spec.cooldown_seconds < 0 {
            return Err(PlacementError::InvalidBoardSpec {
                reason: "cooldown must not be negative",
            });
        }
        if spec.name.trim().is_empty() {
            return Err(PlacementError::InvalidBoardSpec {
                reason: "name must not be empty",
            });
        }

        let board = Board {
            id: Uuid::new_v4(),
            name: spec.name,
            width: spec.width,
            height: spec.height,
            created_at: now,
            duration_minutes: spec.duration_minutes,
            explicit_close_at: None,
            allow_redraw: spec.allow_redraw,
            allow_after_close_viewing: spec.allow_after_close_viewing,
            cooldown_seconds: spec.cooldown_seconds,
            creator_id: spec.creator_id,
        };
        self.db.insert_board(&board)?;

        info!(
            "Board '{}' created: {} ({}x{}, {}min)",
            board.name, board.id, board.width, board.height, board.duration_minutes
        );
        Ok(board)
    }

    pub fn get(&self, board_id: Uuid) -> Result<Board, PlacementError> {
        self.db
            .get_board(&board_id.to_string())?
            .ok_or(PlacementError::NotFound)
    }

    pub fn list(&self) -> Result<Vec<Board>, PlacementError> {
        Ok(self.db.list_boards()?)
    }

    pub fn is_open_for_writes(&self, board_id: Uuid, now: DateTime<Utc>) -> Result<bool, PlacementError> {
        Ok(self.get(board_id)?.is_open_for_writes(now))
    }

    /// Explicitly close a board. Idempotent: closing an already-closed board
    /// (explicitly or by natural expiry) changes nothing.
    pub fn close(&self, board_id: Uuid, now: DateTime<Utc>) -> Result<Board, PlacementError> {
        let board = self.get(board_id)?;
        if !board.is_open_for_writes(now) {
            return Ok(board);
        }

        self.db.set_explicit_close(&board_id.to_string(), &fmt_ts(now))?;
        info!("Board {} explicitly closed", board_id);
        self.get(board_id)
    }
}
