/// Database row types — these map directly to SQLite rows.
/// Distinct from mural-types API models to keep the DB layer independent;
/// `into_model` does the string-to-typed conversion in one place.
use anyhow::Result;

use mural_types::models::{Board, Cell, Contributor, HistoryEntry};

use crate::time::parse_ts;

pub struct BoardRow {
    pub id: String,
    pub name: String,
    pub width: i64,
    pub height: i64,
    pub created_at: String,
    pub duration_minutes: i64,
    pub explicit_close_at: Option<String>,
    pub allow_redraw: bool,
    pub allow_after_close_viewing: bool,
    pub cooldown_seconds: i64,
    pub creator_id: String,
}

impl BoardRow {
    pub fn into_model(self) -> Result<Board> {
        Ok(Board {
            id: self.id.parse()?,
            name: self.name,
            width: self.width as u32,
            height: self.height as u32,
            created_at: parse_ts(&self.created_at)?,
            duration_minutes: self.duration_minutes,
            explicit_close_at: self
                .explicit_close_at
                .as_deref()
                .map(parse_ts)
                .transpose()?,
            allow_redraw: self.allow_redraw,
            allow_after_close_viewing: self.allow_after_close_viewing,
            cooldown_seconds: self.cooldown_seconds,
            creator_id: self.creator_id.parse()?,
        })
    }
}

pub struct CellRow {
    pub board_id: String,
    pub x: i64,
    pub y: i64,
    pub color: String,
    pub last_modified_at: String,
    pub last_modified_by: String,
    pub modification_count: i64,
    pub distinct_editors: i64,
}

impl CellRow {
    pub fn into_model(self) -> Result<Cell> {
        Ok(Cell {
            board_id: self.board_id.parse()?,
            x: self.x as u32,
            y: self.y as u32,
            color: self.color,
            last_modified_at: parse_ts(&self.last_modified_at)?,
            last_modified_by: self.last_modified_by.parse()?,
            modification_count: self.modification_count as u64,
            distinct_editors: self.distinct_editors as u64,
        })
    }
}

pub struct HistoryRow {
    pub seq: i64,
    pub board_id: String,
    pub x: i64,
    pub y: i64,
    pub color: String,
    pub actor_id: String,
    pub actor_name: String,
    pub timestamp: String,
}

impl HistoryRow {
    pub fn into_model(self) -> Result<HistoryEntry> {
        Ok(HistoryEntry {
            seq: self.seq,
            board_id: self.board_id.parse()?,
            x: self.x as u32,
            y: self.y as u32,
            color: self.color,
            actor_id: self.actor_id.parse()?,
            actor_name: self.actor_name,
            timestamp: parse_ts(&self.timestamp)?,
        })
    }
}

pub struct ContributorRow {
    pub board_id: String,
    pub actor_id: String,
    pub display_name: String,
    pub pixels_count: i64,
    pub last_placement_at: String,
}

impl ContributorRow {
    pub fn into_model(self) -> Result<Contributor> {
        Ok(Contributor {
            board_id: self.board_id.parse()?,
            actor_id: self.actor_id.parse()?,
            display_name: self.display_name,
            pixels_count: self.pixels_count as u64,
            last_placement_at: parse_ts(&self.last_placement_at)?,
        })
    }
}
