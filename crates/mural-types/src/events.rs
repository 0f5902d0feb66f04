use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BoardEvent {
    /// Server confirms successful authentication
    Ready { actor_id: Uuid, display_name: String },

    /// An accepted placement — viewers apply it as a patch on top of the
    /// snapshot they fetched when subscribing
    PixelPlaced {
        board_id: Uuid,
        x: u32,
        y: u32,
        color: String,
        actor_id: Uuid,
        display_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A board was explicitly closed
    BoardClosed {
        board_id: Uuid,
        closed_at: chrono::DateTime<chrono::Utc>,
    },

    /// Number of live viewers on a board changed
    ViewerCount { board_id: Uuid, viewers: usize },
}

impl BoardEvent {
    /// Returns the board_id if this event is scoped to a specific board.
    /// Events that return `None` are delivered to every connection.
    pub fn board_id(&self) -> Option<Uuid> {
        match self {
            Self::PixelPlaced { board_id, .. } => Some(*board_id),
            Self::BoardClosed { board_id, .. } => Some(*board_id),
            Self::ViewerCount { board_id, .. } => Some(*board_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving events for these boards. The server only forwards
    /// board-scoped events for boards the client has subscribed to.
    Subscribe { board_ids: Vec<Uuid> },

    /// Stop receiving events for these boards
    Unsubscribe { board_ids: Vec<Uuid> },
}
