use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use mural_db::time::fmt_ts;
use mural_db::{Database, queries};
use mural_gateway::dispatcher::Dispatcher;
use mural_types::events::BoardEvent;
use mural_types::models::{Cell, Contributor};

use crate::cooldown;
use crate::error::PlacementError;

/// A validated placement request. The caller (request layer) has already
/// authenticated the actor and checked the color shape.
#[derive(Debug, Clone)]
pub struct PlacementRequest {
    pub board_id: Uuid,
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub actor_id: Uuid,
    pub display_name: String,
    pub now: DateTime<Utc>,
}

/// What the write transaction decided. Policy rejections roll the
/// transaction back with nothing written.
enum TxOutcome {
    Placed(Cell),
    RedrawForbidden,
    CooldownActive { retry_after_seconds: i64 },
}

/// Single entry point for pixel writes. Sequences validation, the atomic
/// placement transaction (cooldown gate, redraw check, history append, cell
/// upsert, contributor update), and the best-effort broadcast.
///
/// All storage work runs on the calling thread; async handlers invoke this
/// through `spawn_blocking`. The single writer connection serializes
/// placement transactions, so two concurrent writes to the same cell can
/// never observe a stale modification count.
pub struct PlacementEngine {
    db: Arc<Database>,
    hub: Dispatcher,
}

impl PlacementEngine {
    pub fn new(db: Arc<Database>, hub: Dispatcher) -> Self {
        Self { db, hub }
    }

    pub fn place_pixel(&self, req: PlacementRequest) -> Result<Cell, PlacementError> {
        // Board lookup and lifecycle/bounds checks are read-only and run
        // against the reader pool, off the writer's lock.
        let board = self
            .db
            .get_board(&req.board_id.to_string())?
            .ok_or(PlacementError::NotFound)?;
        if !board.is_open_for_writes(req.now) {
            return Err(PlacementError::BoardClosed);
        }
        if req.x >= board.width || req.y >= board.height {
            return Err(PlacementError::OutOfBounds { x: req.x, y: req.y });
        }

        let bid = req.board_id.to_string();
        let aid = req.actor_id.to_string();
        let ts = fmt_ts(req.now);

        // The placement transaction. The history append comes ahead of the
        // projection writes; the log is the source of truth and
        // `BoardHistory::rebuild` can regenerate cells and contributor stats
        // from it alone.
        let outcome = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Cooldown is checked ahead of the redraw policy: a rate-limited
            // actor is told to wait, whatever cell they aimed at.
            let last_placement_at = queries::contributor_for(&tx, &bid, &aid)?
                .map(|c: Contributor| c.last_placement_at);
            let verdict = cooldown::check(last_placement_at, req.now, board.cooldown_seconds);
            if !verdict.allowed {
                return Ok(TxOutcome::CooldownActive {
                    retry_after_seconds: verdict.retry_after_seconds,
                });
            }

            if !board.allow_redraw && queries::cell_at(&tx, &bid, req.x, req.y)?.is_some() {
                return Ok(TxOutcome::RedrawForbidden);
            }

            queries::append_history(
                &tx,
                &bid,
                req.x,
                req.y,
                &req.color,
                &aid,
                &req.display_name,
                &ts,
            )?;
            queries::upsert_cell(&tx, &bid, req.x, req.y, &req.color, &aid, &ts)?;
            queries::record_editor(&tx, &bid, req.x, req.y, &aid)?;
            queries::upsert_contributor(&tx, &bid, &aid, &req.display_name, &ts)?;

            let cell = queries::cell_at(&tx, &bid, req.x, req.y)?
                .ok_or_else(|| anyhow!("cell missing immediately after upsert"))?;

            tx.commit()?;
            Ok(TxOutcome::Placed(cell))
        })?;

        let cell = match outcome {
            TxOutcome::Placed(cell) => cell,
            TxOutcome::RedrawForbidden => return Err(PlacementError::RedrawForbidden),
            TxOutcome::CooldownActive { retry_after_seconds } => {
                return Err(PlacementError::CooldownActive { retry_after_seconds });
            }
        };

        debug!(
            "Placed {} at ({}, {}) on {} by {}",
            cell.color, cell.x, cell.y, req.board_id, req.display_name
        );

        // Fire-and-forget: viewers that miss this refetch the snapshot.
        self.hub.publish(&BoardEvent::PixelPlaced {
            board_id: req.board_id,
            x: cell.x,
            y: cell.y,
            color: cell.color.clone(),
            actor_id: req.actor_id,
            display_name: req.display_name,
            timestamp: req.now,
        });

        Ok(cell)
    }

    // -- Read surfaces (bypass the write pipeline) --

    pub fn cell(&self, board_id: Uuid, x: u32, y: u32) -> Result<Option<Cell>, PlacementError> {
        Ok(self.db.get_cell(&board_id.to_string(), x, y)?)
    }

    /// Full current snapshot of every painted cell.
    pub fn snapshot(&self, board_id: Uuid) -> Result<Vec<Cell>, PlacementError> {
        self.require_board(board_id)?;
        Ok(self.db.list_cells(&board_id.to_string())?)
    }

    /// Leaderboard: contributors sorted by pixels placed, descending.
    pub fn contributors(&self, board_id: Uuid) -> Result<Vec<Contributor>, PlacementError> {
        self.require_board(board_id)?;
        Ok(self.db.list_contributors(&board_id.to_string())?)
    }

    fn require_board(&self, board_id: Uuid) -> Result<(), PlacementError> {
        self.db
            .get_board(&board_id.to_string())?
            .map(|_| ())
            .ok_or(PlacementError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::registry::{BoardRegistry, BoardSpec};

    struct Fixture {
        db: Arc<Database>,
        registry: BoardRegistry,
        engine: PlacementEngine,
        hub: Dispatcher,
    }

    fn fixture() -> Fixture {
        let path = std::env::temp_dir().join(format!("mural-engine-test-{}.db", Uuid::new_v4()));
        let db = Arc::new(Database::open(&path).unwrap());
        let hub = Dispatcher::new();
        Fixture {
            registry: BoardRegistry::new(db.clone()),
            engine: PlacementEngine::new(db.clone(), hub.clone()),
            db,
            hub,
        }
    }

    fn spec(cooldown_seconds: i64, allow_redraw: bool) -> BoardSpec {
        BoardSpec {
            name: "plaza".into(),
            width: 10,
            height: 10,
            duration_minutes: 60,
            allow_redraw,
            allow_after_close_viewing: true,
            cooldown_seconds,
            creator_id: Uuid::new_v4(),
        }
    }

    fn request(board_id: Uuid, x: u32, y: u32, color: &str, actor: Uuid, now: DateTime<Utc>) -> PlacementRequest {
        PlacementRequest {
            board_id,
            x,
            y,
            color: color.into(),
            actor_id: actor,
            display_name: format!("actor-{}", &actor.to_string()[..8]),
            now,
        }
    }

    #[test]
    fn accepted_placement_writes_everything() {
        let f = fixture();
        let now = Utc::now();
        let board = f.registry.create(spec(0, true), now).unwrap();
        let actor = Uuid::new_v4();

        let cell = f
            .engine
            .place_pixel(request(board.id, 2, 3, "#FF0000", actor, now))
            .unwrap();
        assert_eq!(cell.color, "#FF0000");
        assert_eq!(cell.modification_count, 1);
        assert_eq!(cell.distinct_editors, 1);
        assert_eq!(cell.last_modified_by, actor);

        let history = f.db.history_range(&board.id.to_string(), None, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].x, history[0].y), (2, 3));

        let contributors = f.engine.contributors(board.id).unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0].pixels_count, 1);

        assert_eq!(f.engine.snapshot(board.id).unwrap().len(), 1);
    }

    #[test]
    fn rejects_unknown_board_and_out_of_bounds() {
        let f = fixture();
        let now = Utc::now();

        assert!(matches!(
            f.engine
                .place_pixel(request(Uuid::new_v4(), 0, 0, "#FFFFFF", Uuid::new_v4(), now)),
            Err(PlacementError::NotFound)
        ));

        let board = f.registry.create(spec(0, true), now).unwrap();
        for (x, y) in [(10, 0), (0, 10), (u32::MAX, 0)] {
            assert!(matches!(
                f.engine
                    .place_pixel(request(board.id, x, y, "#FFFFFF", Uuid::new_v4(), now)),
                Err(PlacementError::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn rejects_writes_on_closed_boards() {
        let f = fixture();
        let now = Utc::now();
        let board = f.registry.create(spec(0, true), now).unwrap();

        // Naturally expired
        assert!(matches!(
            f.engine.place_pixel(request(
                board.id,
                0,
                0,
                "#FFFFFF",
                Uuid::new_v4(),
                now + Duration::minutes(60)
            )),
            Err(PlacementError::BoardClosed)
        ));

        // Explicitly closed, well before expiry
        f.registry.close(board.id, now + Duration::minutes(1)).unwrap();
        assert!(matches!(
            f.engine.place_pixel(request(
                board.id,
                0,
                0,
                "#FFFFFF",
                Uuid::new_v4(),
                now + Duration::minutes(2)
            )),
            Err(PlacementError::BoardClosed)
        ));
    }

    #[test]
    fn overwrites_accumulate_counters() {
        let f = fixture();
        let now = Utc::now();
        let board = f.registry.create(spec(0, true), now).unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        f.engine.place_pixel(request(board.id, 5, 5, "#111111", a, now)).unwrap();
        f.engine
            .place_pixel(request(board.id, 5, 5, "#222222", b, now + Duration::seconds(1)))
            .unwrap();
        let cell = f
            .engine
            .place_pixel(request(board.id, 5, 5, "#333333", a, now + Duration::seconds(2)))
            .unwrap();

        assert_eq!(cell.color, "#333333");
        assert_eq!(cell.modification_count, 3);
        assert_eq!(cell.distinct_editors, 2);

        // Last-write-wins matches the chronologically last history entry.
        let history = f.db.history_range(&board.id.to_string(), None, None).unwrap();
        assert_eq!(history.last().unwrap().color, "#333333");
    }

    #[test]
    fn cooldown_rejection_records_nothing() {
        let f = fixture();
        let now = Utc::now();
        let board = f.registry.create(spec(5, true), now).unwrap();
        let actor = Uuid::new_v4();

        f.engine.place_pixel(request(board.id, 0, 0, "#FF0000", actor, now)).unwrap();

        let rejected = f.engine.place_pixel(request(
            board.id,
            1,
            0,
            "#FF0000",
            actor,
            now + Duration::seconds(1),
        ));
        match rejected {
            Err(PlacementError::CooldownActive { retry_after_seconds }) => {
                assert_eq!(retry_after_seconds, 4)
            }
            other => panic!("expected cooldown rejection, got {:?}", other.map(|c| c.color)),
        }

        // Rejection left no trace: history, contributor count and
        // last_placement_at are exactly as after the first placement.
        assert_eq!(f.db.history_range(&board.id.to_string(), None, None).unwrap().len(), 1);
        let contributor = f
            .db
            .get_contributor(&board.id.to_string(), &actor.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(contributor.pixels_count, 1);

        // Cooldown applies across cells, not per cell.
        assert!(
            f.engine
                .place_pixel(request(board.id, 9, 9, "#FF0000", actor, now + Duration::seconds(5)))
                .is_ok()
        );
    }

    #[test]
    fn end_to_end_scenario() {
        // 10x10 board, 60 minutes, 5s cooldown, redraw disallowed.
        let f = fixture();
        let t0 = Utc::now();
        let board = f.registry.create(spec(5, false), t0).unwrap();
        let (actor_a, actor_b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut events = f.hub.subscribe();

        // A places (2,3) red at t0 -> accepted.
        let cell = f
            .engine
            .place_pixel(request(board.id, 2, 3, "#FF0000", actor_a, t0))
            .unwrap();
        assert_eq!(cell.color, "#FF0000");
        let contributors = f.engine.contributors(board.id).unwrap();
        assert_eq!(contributors[0].pixels_count, 1);

        // A attempts (2,3) green at t0+1s -> cooldown, ~4s left.
        // (Redraw would also reject, but the cooldown gate fires first for A.)
        assert!(matches!(
            f.engine.place_pixel(request(
                board.id,
                2,
                3,
                "#00FF00",
                actor_a,
                t0 + Duration::seconds(1)
            )),
            Err(PlacementError::CooldownActive { retry_after_seconds: 4 })
        ));

        // B attempts (2,3) green at t0+1s -> redraw forbidden, independent of
        // cooldown (B has never placed).
        assert!(matches!(
            f.engine.place_pixel(request(
                board.id,
                2,
                3,
                "#00FF00",
                actor_b,
                t0 + Duration::seconds(1)
            )),
            Err(PlacementError::RedrawForbidden)
        ));

        // B places (9,9) blue at t0+1s -> accepted.
        let cell = f
            .engine
            .place_pixel(request(board.id, 9, 9, "#0000FF", actor_b, t0 + Duration::seconds(1)))
            .unwrap();
        assert_eq!(cell.color, "#0000FF");

        // Exactly the two accepted placements went out on the bus.
        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert!(first.json.contains("#FF0000"));
        assert!(second.json.contains("#0000FF"));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn parallel_placements_at_distinct_cells_all_land() {
        let f = fixture();
        let now = Utc::now();
        let board = f.registry.create(spec(0, true), now).unwrap();
        let engine = Arc::new(f.engine);

        std::thread::scope(|scope| {
            for x in 0..10u32 {
                let engine = engine.clone();
                let board_id = board.id;
                scope.spawn(move || {
                    for y in 0..10u32 {
                        engine
                            .place_pixel(request(board_id, x, y, "#ABCDEF", Uuid::new_v4(), now))
                            .unwrap();
                    }
                });
            }
        });

        let cells = engine.snapshot(board.id).unwrap();
        assert_eq!(cells.len(), 100);
        assert!(cells.iter().all(|c| c.modification_count == 1));
        assert_eq!(f.db.history_range(&board.id.to_string(), None, None).unwrap().len(), 100);
    }

    #[test]
    fn parallel_placements_at_the_same_cell_never_lose_updates() {
        let f = fixture();
        let now = Utc::now();
        let board = f.registry.create(spec(0, true), now).unwrap();
        let engine = Arc::new(f.engine);

        let writers = 8;
        let per_writer = 25;
        std::thread::scope(|scope| {
            for _ in 0..writers {
                let engine = engine.clone();
                let board_id = board.id;
                scope.spawn(move || {
                    let actor = Uuid::new_v4();
                    for _ in 0..per_writer {
                        engine
                            .place_pixel(request(board_id, 4, 4, "#00FF00", actor, now))
                            .unwrap();
                    }
                });
            }
        });

        let cell = engine.cell(board.id, 4, 4).unwrap().unwrap();
        assert_eq!(cell.modification_count, (writers * per_writer) as u64);
        assert_eq!(cell.distinct_editors, writers as u64);
    }
}
