use anyhow::Result;
use rusqlite::Connection;

use mural_types::models::{Board, Cell, Contributor, HistoryEntry};

use crate::Database;
use crate::models::{BoardRow, CellRow, ContributorRow, HistoryRow};
use crate::time::fmt_ts;

/// Convenience wrappers over the reader pool / writer connection. The free
/// functions below take a `&Connection` so the placement engine can call them
/// inside its own explicit write transaction.
impl Database {
    // -- Boards --

    pub fn insert_board(&self, board: &Board) -> Result<()> {
        self.with_conn_mut(|conn| insert_board(conn, board))
    }

    pub fn get_board(&self, id: &str) -> Result<Option<Board>> {
        self.with_conn(|conn| board_by_id(conn, id))
    }

    pub fn list_boards(&self) -> Result<Vec<Board>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} FROM boards ORDER BY created_at DESC",
                BOARD_SELECT
            ))?;
            let rows = stmt
                .query_map([], board_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(BoardRow::into_model).collect()
        })
    }

    pub fn set_explicit_close(&self, id: &str, closed_at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE boards SET explicit_close_at = ?2
                 WHERE id = ?1 AND explicit_close_at IS NULL",
                (id, closed_at),
            )?;
            Ok(())
        })
    }

    // -- Cells --

    pub fn get_cell(&self, board_id: &str, x: u32, y: u32) -> Result<Option<Cell>> {
        self.with_conn(|conn| cell_at(conn, board_id, x, y))
    }

    pub fn list_cells(&self, board_id: &str) -> Result<Vec<Cell>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE c.board_id = ?1", CELL_SELECT))?;
            let rows = stmt
                .query_map([board_id], cell_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(CellRow::into_model).collect()
        })
    }

    // -- History --

    /// Entries for a board, oldest first, optionally bounded on either side
    /// (inclusive). Timestamp strings compare lexicographically.
    pub fn history_range(
        &self,
        board_id: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, board_id, x, y, color, actor_id, actor_name, timestamp
                 FROM history
                 WHERE board_id = ?1
                   AND (?2 IS NULL OR timestamp >= ?2)
                   AND (?3 IS NULL OR timestamp <= ?3)
                 ORDER BY timestamp ASC, seq ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![board_id, from, to], history_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(HistoryRow::into_model).collect()
        })
    }

    // -- Contributors --

    pub fn get_contributor(&self, board_id: &str, actor_id: &str) -> Result<Option<Contributor>> {
        self.with_conn(|conn| contributor_for(conn, board_id, actor_id))
    }

    pub fn list_contributors(&self, board_id: &str) -> Result<Vec<Contributor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT board_id, actor_id, display_name, pixels_count, last_placement_at
                 FROM contributors
                 WHERE board_id = ?1
                 ORDER BY pixels_count DESC, last_placement_at DESC",
            )?;
            let rows = stmt
                .query_map([board_id], contributor_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ContributorRow::into_model).collect()
        })
    }
}

const BOARD_SELECT: &str = "SELECT id, name, width, height, created_at, duration_minutes, \
     explicit_close_at, allow_redraw, allow_after_close_viewing, cooldown_seconds, creator_id";

const CELL_SELECT: &str = "SELECT c.board_id, c.x, c.y, c.color, c.last_modified_at, \
     c.last_modified_by, c.modification_count, \
     (SELECT COUNT(*) FROM cell_editors e \
       WHERE e.board_id = c.board_id AND e.x = c.x AND e.y = c.y) AS distinct_editors \
     FROM cells c";

fn board_row(row: &rusqlite::Row) -> std::result::Result<BoardRow, rusqlite::Error> {
    Ok(BoardRow {
        id: row.get(0)?,
        name: row.get(1)?,
        width: row.get(2)?,
        height: row.get(3)?,
        created_at: row.get(4)?,
        duration_minutes: row.get(5)?,
        explicit_close_at: row.get(6)?,
        allow_redraw: row.get(7)?,
        allow_after_close_viewing: row.get(8)?,
        cooldown_seconds: row.get(9)?,
        creator_id: row.get(10)?,
    })
}

fn cell_row(row: &rusqlite::Row) -> std::result::Result<CellRow, rusqlite::Error> {
    Ok(CellRow {
        board_id: row.get(0)?,
        x: row.get(1)?,
        y: row.get(2)?,
        color: row.get(3)?,
        last_modified_at: row.get(4)?,
        last_modified_by: row.get(5)?,
        modification_count: row.get(6)?,
        distinct_editors: row.get(7)?,
    })
}

fn history_row(row: &rusqlite::Row) -> std::result::Result<HistoryRow, rusqlite::Error> {
    Ok(HistoryRow {
        seq: row.get(0)?,
        board_id: row.get(1)?,
        x: row.get(2)?,
        y: row.get(3)?,
        color: row.get(4)?,
        actor_id: row.get(5)?,
        actor_name: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

fn contributor_row(row: &rusqlite::Row) -> std::result::Result<ContributorRow, rusqlite::Error> {
    Ok(ContributorRow {
        board_id: row.get(0)?,
        actor_id: row.get(1)?,
        display_name: row.get(2)?,
        pixels_count: row.get(3)?,
        last_placement_at: row.get(4)?,
    })
}

// -- Free functions usable inside an explicit transaction --

pub fn insert_board(conn: &Connection, board: &Board) -> Result<()> {
    conn.execute(
        "INSERT INTO boards (id, name, width, height, created_at, duration_minutes,
                             explicit_close_at, allow_redraw, allow_after_close_viewing,
                             cooldown_seconds, creator_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            board.id.to_string(),
            board.name,
            board.width,
            board.height,
            fmt_ts(board.created_at),
            board.duration_minutes,
            board.explicit_close_at.map(fmt_ts),
            board.allow_redraw,
            board.allow_after_close_viewing,
            board.cooldown_seconds,
            board.creator_id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn board_by_id(conn: &Connection, id: &str) -> Result<Option<Board>> {
    let mut stmt = conn.prepare(&format!("{} FROM boards WHERE id = ?1", BOARD_SELECT))?;
    let row = stmt.query_row([id], board_row).optional()?;
    row.map(BoardRow::into_model).transpose()
}

pub fn cell_at(conn: &Connection, board_id: &str, x: u32, y: u32) -> Result<Option<Cell>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE c.board_id = ?1 AND c.x = ?2 AND c.y = ?3",
        CELL_SELECT
    ))?;
    let row = stmt
        .query_row(rusqlite::params![board_id, x, y], cell_row)
        .optional()?;
    row.map(CellRow::into_model).transpose()
}

/// Conflict-target atomic upsert: first write creates the row with
/// modification_count = 1, every later write overwrites color/owner and
/// increments the counter in the same statement.
pub fn upsert_cell(
    conn: &Connection,
    board_id: &str,
    x: u32,
    y: u32,
    color: &str,
    actor_id: &str,
    timestamp: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO cells (board_id, x, y, color, last_modified_at, last_modified_by,
                            modification_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
         ON CONFLICT(board_id, x, y) DO UPDATE SET
            color = excluded.color,
            last_modified_at = excluded.last_modified_at,
            last_modified_by = excluded.last_modified_by,
            modification_count = cells.modification_count + 1",
        rusqlite::params![board_id, x, y, color, timestamp, actor_id],
    )?;
    Ok(())
}

pub fn record_editor(conn: &Connection, board_id: &str, x: u32, y: u32, actor_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO cell_editors (board_id, x, y, actor_id)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![board_id, x, y, actor_id],
    )?;
    Ok(())
}

/// Append a placement record. Returns the assigned seq.
pub fn append_history(
    conn: &Connection,
    board_id: &str,
    x: u32,
    y: u32,
    color: &str,
    actor_id: &str,
    actor_name: &str,
    timestamp: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO history (board_id, x, y, color, actor_id, actor_name, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![board_id, x, y, color, actor_id, actor_name, timestamp],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn contributor_for(conn: &Connection, board_id: &str, actor_id: &str) -> Result<Option<Contributor>> {
    let mut stmt = conn.prepare(
        "SELECT board_id, actor_id, display_name, pixels_count, last_placement_at
         FROM contributors
         WHERE board_id = ?1 AND actor_id = ?2",
    )?;
    let row = stmt
        .query_row([board_id, actor_id], contributor_row)
        .optional()?;
    row.map(ContributorRow::into_model).transpose()
}

/// Atomic upsert: first accepted placement creates the row with
/// pixels_count = 1, later ones increment it and refresh the display name.
pub fn upsert_contributor(
    conn: &Connection,
    board_id: &str,
    actor_id: &str,
    display_name: &str,
    timestamp: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO contributors (board_id, actor_id, display_name, pixels_count,
                                   last_placement_at)
         VALUES (?1, ?2, ?3, 1, ?4)
         ON CONFLICT(board_id, actor_id) DO UPDATE SET
            display_name = excluded.display_name,
            pixels_count = contributors.pixels_count + 1,
            last_placement_at = excluded.last_placement_at",
        rusqlite::params![board_id, actor_id, display_name, timestamp],
    )?;
    Ok(())
}

/// Full ordered log for one board — the replay input for reconciliation and
/// point-in-time reconstruction.
pub fn history_all(conn: &Connection, board_id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT seq, board_id, x, y, color, actor_id, actor_name, timestamp
         FROM history
         WHERE board_id = ?1
         ORDER BY timestamp ASC, seq ASC",
    )?;
    let rows = stmt
        .query_map([board_id], history_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(HistoryRow::into_model).collect()
}

/// Drop every projection derived from the history log (cells, editor sets,
/// contributor stats). The log itself is never touched.
pub fn delete_board_projections(conn: &Connection, board_id: &str) -> Result<()> {
    conn.execute("DELETE FROM cells WHERE board_id = ?1", [board_id])?;
    conn.execute("DELETE FROM cell_editors WHERE board_id = ?1", [board_id])?;
    conn.execute("DELETE FROM contributors WHERE board_id = ?1", [board_id])?;
    Ok(())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use mural_types::models::Board;

    use crate::Database;
    use crate::time::fmt_ts;

    fn open_test_db() -> Database {
        let path = std::env::temp_dir().join(format!("mural-db-test-{}.db", Uuid::new_v4()));
        Database::open(&path).unwrap()
    }

    fn sample_board() -> Board {
        Board {
            id: Uuid::new_v4(),
            name: "lobby".into(),
            width: 16,
            height: 16,
            created_at: Utc::now(),
            duration_minutes: 60,
            explicit_close_at: None,
            allow_redraw: true,
            allow_after_close_viewing: true,
            cooldown_seconds: 5,
            creator_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn board_round_trip() {
        let db = open_test_db();
        let board = sample_board();
        db.insert_board(&board).unwrap();

        let loaded = db.get_board(&board.id.to_string()).unwrap().unwrap();
        assert_eq!(loaded.id, board.id);
        assert_eq!(loaded.width, 16);
        assert_eq!(loaded.cooldown_seconds, 5);
        assert!(loaded.explicit_close_at.is_none());

        assert!(db.get_board(&Uuid::new_v4().to_string()).unwrap().is_none());
    }

    #[test]
    fn explicit_close_is_written_once() {
        let db = open_test_db();
        let board = sample_board();
        db.insert_board(&board).unwrap();

        let id = board.id.to_string();
        let first = fmt_ts(Utc::now());
        db.set_explicit_close(&id, &first).unwrap();
        // Second close must not move the recorded instant.
        db.set_explicit_close(&id, &fmt_ts(Utc::now() + chrono::Duration::hours(1)))
            .unwrap();

        let loaded = db.get_board(&id).unwrap().unwrap();
        assert_eq!(fmt_ts(loaded.explicit_close_at.unwrap()), first);
    }

    #[test]
    fn cell_upsert_accumulates() {
        let db = open_test_db();
        let board = sample_board();
        db.insert_board(&board).unwrap();
        let bid = board.id.to_string();
        let (a, b) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());

        db.with_conn_mut(|conn| {
            let ts = fmt_ts(Utc::now());
            super::upsert_cell(conn, &bid, 3, 4, "#FF0000", &a, &ts)?;
            super::record_editor(conn, &bid, 3, 4, &a)?;
            super::upsert_cell(conn, &bid, 3, 4, "#00FF00", &b, &ts)?;
            super::record_editor(conn, &bid, 3, 4, &b)?;
            super::upsert_cell(conn, &bid, 3, 4, "#0000FF", &a, &ts)?;
            super::record_editor(conn, &bid, 3, 4, &a)?;
            Ok(())
        })
        .unwrap();

        let cell = db.get_cell(&bid, 3, 4).unwrap().unwrap();
        assert_eq!(cell.color, "#0000FF");
        assert_eq!(cell.modification_count, 3);
        assert_eq!(cell.distinct_editors, 2);
        assert_eq!(cell.last_modified_by.to_string(), a);
    }

    #[test]
    fn history_range_is_ordered_and_bounded() {
        let db = open_test_db();
        let board = sample_board();
        db.insert_board(&board).unwrap();
        let bid = board.id.to_string();
        let actor = Uuid::new_v4().to_string();

        let t0 = Utc::now();
        let stamps: Vec<String> = (0..4)
            .map(|i| fmt_ts(t0 + chrono::Duration::seconds(i)))
            .collect();
        db.with_conn_mut(|conn| {
            for (i, ts) in stamps.iter().enumerate() {
                super::append_history(conn, &bid, i as u32, 0, "#112233", &actor, "ann", ts)?;
            }
            Ok(())
        })
        .unwrap();

        let all = db.history_range(&bid, None, None).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

        let mid = db
            .history_range(&bid, Some(stamps[1].as_str()), Some(stamps[2].as_str()))
            .unwrap();
        assert_eq!(mid.len(), 2);
        assert_eq!(mid[0].x, 1);
        assert_eq!(mid[1].x, 2);
    }

    #[test]
    fn contributor_upsert_counts() {
        let db = open_test_db();
        let board = sample_board();
        db.insert_board(&board).unwrap();
        let bid = board.id.to_string();
        let actor = Uuid::new_v4().to_string();

        db.with_conn_mut(|conn| {
            super::upsert_contributor(conn, &bid, &actor, "ann", &fmt_ts(Utc::now()))?;
            super::upsert_contributor(conn, &bid, &actor, "ann", &fmt_ts(Utc::now()))?;
            Ok(())
        })
        .unwrap();

        let c = db.get_contributor(&bid, &actor).unwrap().unwrap();
        assert_eq!(c.pixels_count, 2);
        assert_eq!(c.display_name, "ann");
    }
}
