use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-bounded rectangular canvas. Dimensions are fixed at creation;
/// policy fields may be edited until the board closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Set once by an explicit close; natural expiry is never persisted.
    pub explicit_close_at: Option<DateTime<Utc>>,
    pub allow_redraw: bool,
    /// Visitor mode: whether the board stays viewable after it closes.
    /// Stored here, interpreted by the authorization layer.
    pub allow_after_close_viewing: bool,
    pub cooldown_seconds: i64,
    pub creator_id: Uuid,
}

impl Board {
    /// When the board expires naturally, absent an explicit close.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(self.duration_minutes)
    }

    /// Pure lifecycle check: closed once explicitly closed or past expiry,
    /// and closed forever after either.
    pub fn is_open_for_writes(&self, now: DateTime<Utc>) -> bool {
        self.explicit_close_at.is_none() && now < self.expires_at()
    }

    /// The moment writes stopped (or will stop) being accepted.
    pub fn closes_at(&self) -> DateTime<Utc> {
        match self.explicit_close_at {
            Some(at) => at.min(self.expires_at()),
            None => self.expires_at(),
        }
    }
}

/// Current state of one painted position. Derived from the history log;
/// `modification_count` and `distinct_editors` accumulate across overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub board_id: Uuid,
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: Uuid,
    pub modification_count: u64,
    pub distinct_editors: u64,
}

/// One immutable placement record. `seq` is the insertion-order tiebreak for
/// entries sharing a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: i64,
    pub board_id: Uuid,
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-actor placement statistics for a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub board_id: Uuid,
    pub actor_id: Uuid,
    pub display_name: String,
    pub pixels_count: u64,
    pub last_placement_at: DateTime<Utc>,
}

/// Normalize a `#RRGGBB` hex color to uppercase. Returns `None` for anything
/// else; shape validation belongs to the request layer, ahead of the engine.
pub fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", hex.to_ascii_uppercase()))
}
