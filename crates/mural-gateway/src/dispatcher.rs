use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::warn;
use uuid::Uuid;

use mural_types::events::BoardEvent;

/// A pre-serialized event on the broadcast bus. `board_id` carries the scope
/// so each connection can filter against its own subscription set without
/// re-parsing the payload.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub board_id: Option<Uuid>,
    pub json: String,
}

/// Fan-out hub for accepted placements and board lifecycle events.
/// Constructed once in main and handed to the engine and the WebSocket
/// route explicitly — never looked up through global state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connected client receives every message; board-scoped ones are
    /// filtered per connection against its subscription set.
    broadcast_tx: broadcast::Sender<BroadcastMessage>,

    /// Live viewers per board: board_id -> subscriber count
    viewer_counts: RwLock<HashMap<Uuid, usize>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                viewer_counts: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the event bus. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to all connected clients. Best-effort: delivery is
    /// never transactional with persistence, and a bus with no receivers is
    /// not an error.
    pub fn publish(&self, event: &BoardEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize gateway event: {}", e);
                return;
            }
        };
        let _ = self.inner.broadcast_tx.send(BroadcastMessage {
            board_id: event.board_id(),
            json,
        });
    }

    /// A connection subscribed to a board. Returns the new viewer count and
    /// announces it on the bus.
    pub async fn viewer_joined(&self, board_id: Uuid) -> usize {
        let viewers = {
            let mut counts = self.inner.viewer_counts.write().await;
            let count = counts.entry(board_id).or_insert(0);
            *count += 1;
            *count
        };
        self.publish(&BoardEvent::ViewerCount { board_id, viewers });
        viewers
    }

    /// A connection unsubscribed from a board (or disconnected).
    pub async fn viewer_left(&self, board_id: Uuid) -> usize {
        let viewers = {
            let mut counts = self.inner.viewer_counts.write().await;
            match counts.get_mut(&board_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    *count
                }
                Some(_) => {
                    counts.remove(&board_id);
                    0
                }
                None => 0,
            }
        };
        self.publish(&BoardEvent::ViewerCount { board_id, viewers });
        viewers
    }

    /// Current viewer count for a board.
    pub async fn viewer_count(&self, board_id: Uuid) -> usize {
        self.inner
            .viewer_counts
            .read()
            .await
            .get(&board_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
