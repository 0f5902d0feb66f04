use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE boards (
                id                          TEXT PRIMARY KEY,
                name                        TEXT NOT NULL,
                width                       INTEGER NOT NULL,
                height                      INTEGER NOT NULL,
                created_at                  TEXT NOT NULL,
                duration_minutes            INTEGER NOT NULL,
                explicit_close_at           TEXT,
                allow_redraw                INTEGER NOT NULL DEFAULT 1,
                allow_after_close_viewing   INTEGER NOT NULL DEFAULT 1,
                cooldown_seconds            INTEGER NOT NULL DEFAULT 0,
                creator_id                  TEXT NOT NULL
            );

            -- Current state per position. The composite primary key is what
            -- lets the upsert below be a conflict-target atomic increment.
            CREATE TABLE cells (
                board_id            TEXT NOT NULL REFERENCES boards(id),
                x                   INTEGER NOT NULL,
                y                   INTEGER NOT NULL,
                color               TEXT NOT NULL,
                last_modified_at    TEXT NOT NULL,
                last_modified_by    TEXT NOT NULL,
                modification_count  INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (board_id, x, y)
            );

            -- Distinct-editor set per cell, one row per (cell, actor).
            CREATE TABLE cell_editors (
                board_id    TEXT NOT NULL,
                x           INTEGER NOT NULL,
                y           INTEGER NOT NULL,
                actor_id    TEXT NOT NULL,
                PRIMARY KEY (board_id, x, y, actor_id)
            );

            -- Append-only placement log. seq breaks timestamp ties in
            -- insertion order.
            CREATE TABLE history (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                board_id    TEXT NOT NULL REFERENCES boards(id),
                x           INTEGER NOT NULL,
                y           INTEGER NOT NULL,
                color       TEXT NOT NULL,
                actor_id    TEXT NOT NULL,
                actor_name  TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );

            CREATE INDEX idx_history_board_ts
                ON history(board_id, timestamp, seq);

            CREATE TABLE contributors (
                board_id            TEXT NOT NULL REFERENCES boards(id),
                actor_id            TEXT NOT NULL,
                display_name        TEXT NOT NULL,
                pixels_count        INTEGER NOT NULL DEFAULT 0,
                last_placement_at   TEXT NOT NULL,
                PRIMARY KEY (board_id, actor_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
