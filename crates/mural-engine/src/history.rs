use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use mural_db::time::fmt_ts;
use mural_db::{Database, queries};
use mural_types::models::{Cell, HistoryEntry};

use crate::error::PlacementError;

/// Result of a reconciliation pass over one board's log.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSummary {
    pub entries_replayed: usize,
    pub cells: usize,
    pub contributors: usize,
}

/// Read side of the append-only placement log: ordered range scans,
/// point-in-time reconstruction, and the replay job that rebuilds the
/// derived tables after a crash between log append and projection write.
pub struct BoardHistory {
    db: Arc<Database>,
}

impl BoardHistory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Entries for a board ordered by (timestamp, seq) ascending, optionally
    /// bounded on either side (inclusive).
    pub fn range(
        &self,
        board_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryEntry>, PlacementError> {
        self.require_board(board_id)?;
        Ok(self.db.history_range(
            &board_id.to_string(),
            from.map(fmt_ts).as_deref(),
            to.map(fmt_ts).as_deref(),
        )?)
    }

    /// Board state as of `at`: every entry with `timestamp <= at`, reduced by
    /// (x, y) keeping the latest write per key. Counters accumulate during
    /// the fold, so the result matches what the live cell store contained at
    /// that instant — not just the colors.
    pub fn state_at(&self, board_id: Uuid, at: DateTime<Utc>) -> Result<Vec<Cell>, PlacementError> {
        let entries = self.range(board_id, None, Some(at))?;
        Ok(replay(board_id, &entries))
    }

    /// Rebuild every projection for a board from its log alone: drop cells,
    /// editor sets and contributor stats, then push each entry through the
    /// same upserts the live path uses. Idempotent and safe to repeat.
    pub fn rebuild(&self, board_id: Uuid) -> Result<ReconcileSummary, PlacementError> {
        self.require_board(board_id)?;
        let bid = board_id.to_string();

        let summary = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            queries::delete_board_projections(&tx, &bid)?;

            let entries = queries::history_all(&tx, &bid)?;
            let mut cells = HashSet::new();
            let mut contributors = HashSet::new();
            for entry in &entries {
                let aid = entry.actor_id.to_string();
                let ts = fmt_ts(entry.timestamp);
                queries::upsert_cell(&tx, &bid, entry.x, entry.y, &entry.color, &aid, &ts)?;
                queries::record_editor(&tx, &bid, entry.x, entry.y, &aid)?;
                queries::upsert_contributor(&tx, &bid, &aid, &entry.actor_name, &ts)?;
                cells.insert((entry.x, entry.y));
                contributors.insert(entry.actor_id);
            }

            tx.commit()?;
            Ok(ReconcileSummary {
                entries_replayed: entries.len(),
                cells: cells.len(),
                contributors: contributors.len(),
            })
        })?;

        info!(
            "Rebuilt board {}: {} entries -> {} cells, {} contributors",
            board_id, summary.entries_replayed, summary.cells, summary.contributors
        );
        Ok(summary)
    }

    fn require_board(&self, board_id: Uuid) -> Result<(), PlacementError> {
        self.db
            .get_board(&board_id.to_string())?
            .map(|_| ())
            .ok_or(PlacementError::NotFound)
    }
}

struct CellAccum {
    color: String,
    last_modified_at: DateTime<Utc>,
    last_modified_by: Uuid,
    modification_count: u64,
    editors: HashSet<Uuid>,
}

/// Pure last-write-wins fold over an ordered slice of log entries.
fn replay(board_id: Uuid, entries: &[HistoryEntry]) -> Vec<Cell> {
    let mut acc: HashMap<(u32, u32), CellAccum> = HashMap::new();

    for entry in entries {
        let slot = acc.entry((entry.x, entry.y)).or_insert_with(|| CellAccum {
            color: String::new(),
            last_modified_at: entry.timestamp,
            last_modified_by: entry.actor_id,
            modification_count: 0,
            editors: HashSet::new(),
        });
        slot.color = entry.color.clone();
        slot.last_modified_at = entry.timestamp;
        slot.last_modified_by = entry.actor_id;
        slot.modification_count += 1;
        slot.editors.insert(entry.actor_id);
    }

    let mut cells: Vec<Cell> = acc
        .into_iter()
        .map(|((x, y), slot)| Cell {
            board_id,
            x,
            y,
            color: slot.color,
            last_modified_at: slot.last_modified_at,
            last_modified_by: slot.last_modified_by,
            modification_count: slot.modification_count,
            distinct_editors: slot.editors.len() as u64,
        })
        .collect();
    cells.sort_by_key(|c| (c.y, c.x));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use mural_gateway::dispatcher::Dispatcher;

    use crate::placement::{PlacementEngine, PlacementRequest};
    use crate::registry::{BoardRegistry, BoardSpec};

    struct Fixture {
        db: Arc<Database>,
        registry: BoardRegistry,
        engine: PlacementEngine,
        history: BoardHistory,
    }

    fn fixture() -> Fixture {
        let path = std::env::temp_dir().join(format!("mural-history-test-{}.db", Uuid::new_v4()));
        let db = Arc::new(Database::open(&path).unwrap());
        Fixture {
            registry: BoardRegistry::new(db.clone()),
            engine: PlacementEngine::new(db.clone(), Dispatcher::new()),
            history: BoardHistory::new(db.clone()),
            db,
        }
    }

    fn open_board(f: &Fixture, now: DateTime<Utc>) -> Uuid {
        f.registry
            .create(
                BoardSpec {
                    name: "timeline".into(),
                    width: 10,
                    height: 10,
                    duration_minutes: 600,
                    allow_redraw: true,
                    allow_after_close_viewing: true,
                    cooldown_seconds: 0,
                    creator_id: Uuid::new_v4(),
                },
                now,
            )
            .unwrap()
            .id
    }

    fn place(f: &Fixture, board_id: Uuid, x: u32, y: u32, color: &str, actor: Uuid, now: DateTime<Utc>) {
        f.engine
            .place_pixel(PlacementRequest {
                board_id,
                x,
                y,
                color: color.into(),
                actor_id: actor,
                display_name: "replayer".into(),
                now,
            })
            .unwrap();
    }

    #[test]
    fn state_at_tracks_the_timeline() {
        let f = fixture();
        let t0 = Utc::now();
        let board_id = open_board(&f, t0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        place(&f, board_id, 0, 0, "#111111", a, t0);
        place(&f, board_id, 0, 0, "#222222", b, t0 + Duration::seconds(10));
        place(&f, board_id, 1, 0, "#333333", a, t0 + Duration::seconds(20));

        // Before anything happened.
        assert!(f.history.state_at(board_id, t0 - Duration::seconds(1)).unwrap().is_empty());

        // After the first placement only.
        let early = f.history.state_at(board_id, t0 + Duration::seconds(5)).unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].color, "#111111");
        assert_eq!(early[0].modification_count, 1);

        // Mid-timeline: (0,0) overwritten, (1,0) not yet painted.
        let mid = f.history.state_at(board_id, t0 + Duration::seconds(10)).unwrap();
        assert_eq!(mid.len(), 1);
        assert_eq!(mid[0].color, "#222222");
        assert_eq!(mid[0].modification_count, 2);
        assert_eq!(mid[0].distinct_editors, 2);

        // Idempotent: same instant, same answer.
        let again = f.history.state_at(board_id, t0 + Duration::seconds(10)).unwrap();
        assert_eq!(again.len(), mid.len());
        assert_eq!(again[0].color, mid[0].color);
    }

    #[test]
    fn state_at_now_equals_the_live_snapshot() {
        let f = fixture();
        let t0 = Utc::now();
        let board_id = open_board(&f, t0);

        let actors: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for i in 0..30u32 {
            place(
                &f,
                board_id,
                i % 5,
                i / 10,
                &format!("#0000{:02X}", i),
                actors[(i % 3) as usize],
                t0 + Duration::seconds(i as i64),
            );
        }

        let mut live = f.engine.snapshot(board_id).unwrap();
        live.sort_by_key(|c| (c.y, c.x));
        let reconstructed = f
            .history
            .state_at(board_id, t0 + Duration::seconds(30))
            .unwrap();

        assert_eq!(live.len(), reconstructed.len());
        for (l, r) in live.iter().zip(reconstructed.iter()) {
            assert_eq!((l.x, l.y), (r.x, r.y));
            assert_eq!(l.color, r.color);
            assert_eq!(l.modification_count, r.modification_count);
            assert_eq!(l.distinct_editors, r.distinct_editors);
            assert_eq!(l.last_modified_by, r.last_modified_by);
        }
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let f = fixture();
        let t0 = Utc::now();
        let board_id = open_board(&f, t0);
        let actor = Uuid::new_v4();

        for i in 0..5u32 {
            place(&f, board_id, i, 0, "#ABCDEF", actor, t0 + Duration::seconds(i as i64));
        }

        let all = f.history.range(board_id, None, None).unwrap();
        assert_eq!(all.len(), 5);

        let slice = f
            .history
            .range(
                board_id,
                Some(t0 + Duration::seconds(1)),
                Some(t0 + Duration::seconds(3)),
            )
            .unwrap();
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.first().unwrap().x, 1);
        assert_eq!(slice.last().unwrap().x, 3);

        assert!(matches!(
            f.history.range(Uuid::new_v4(), None, None),
            Err(PlacementError::NotFound)
        ));
    }

    #[test]
    fn rebuild_restores_projections_from_the_log() {
        let f = fixture();
        let t0 = Utc::now();
        let board_id = open_board(&f, t0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        place(&f, board_id, 0, 0, "#111111", a, t0);
        place(&f, board_id, 0, 0, "#222222", b, t0 + Duration::seconds(1));
        place(&f, board_id, 3, 3, "#333333", a, t0 + Duration::seconds(2));

        let before_cells = f.engine.snapshot(board_id).unwrap();
        let before_contributors = f.engine.contributors(board_id).unwrap();

        // Simulate the crash-recovery case: projections lost, log intact.
        f.db.with_conn_mut(|conn| {
            queries::delete_board_projections(conn, &board_id.to_string())
        })
        .unwrap();
        assert!(f.engine.snapshot(board_id).unwrap().is_empty());

        let summary = f.history.rebuild(board_id).unwrap();
        assert_eq!(summary.entries_replayed, 3);
        assert_eq!(summary.cells, 2);
        assert_eq!(summary.contributors, 2);

        let mut after_cells = f.engine.snapshot(board_id).unwrap();
        after_cells.sort_by_key(|c| (c.y, c.x));
        let mut expected = before_cells.clone();
        expected.sort_by_key(|c| (c.y, c.x));
        for (after, before) in after_cells.iter().zip(expected.iter()) {
            assert_eq!((after.x, after.y), (before.x, before.y));
            assert_eq!(after.color, before.color);
            assert_eq!(after.modification_count, before.modification_count);
            assert_eq!(after.distinct_editors, before.distinct_editors);
        }

        let after_contributors = f.engine.contributors(board_id).unwrap();
        assert_eq!(after_contributors.len(), before_contributors.len());
        for (after, before) in after_contributors.iter().zip(before_contributors.iter()) {
            assert_eq!(after.actor_id, before.actor_id);
            assert_eq!(after.pixels_count, before.pixels_count);
        }

        // Running it again changes nothing.
        let summary = f.history.rebuild(board_id).unwrap();
        assert_eq!(summary.entries_replayed, 3);
        assert_eq!(f.engine.snapshot(board_id).unwrap().len(), 2);
    }

    #[test]
    fn contributor_counts_match_the_log() {
        let f = fixture();
        let t0 = Utc::now();
        let board_id = open_board(&f, t0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        for i in 0..7u32 {
            let actor = if i % 3 == 0 { a } else { b };
            place(&f, board_id, i, 0, "#445566", actor, t0 + Duration::seconds(i as i64));
        }

        let entries = f.history.range(board_id, None, None).unwrap();
        for contributor in f.engine.contributors(board_id).unwrap() {
            let from_log = entries
                .iter()
                .filter(|e| e.actor_id == contributor.actor_id)
                .count() as u64;
            assert_eq!(contributor.pixels_count, from_log);
        }
    }
}
