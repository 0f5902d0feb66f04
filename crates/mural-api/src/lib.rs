pub mod boards;
pub mod error;
pub mod middleware;
pub mod pixels;
pub mod timeline;

use std::sync::Arc;

use mural_engine::{BoardHistory, BoardRegistry, PlacementEngine};
use mural_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub registry: BoardRegistry,
    pub engine: PlacementEngine,
    pub history: BoardHistory,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}
