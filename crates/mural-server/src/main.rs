use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mural_api::middleware::require_auth;
use mural_api::{AppState, AppStateInner, boards, pixels, timeline};
use mural_engine::{BoardHistory, BoardRegistry, PlacementEngine};
use mural_gateway::connection;
use mural_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mural=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("MURAL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("MURAL_DB_PATH").unwrap_or_else(|_| "mural.db".into());
    let host = std::env::var("MURAL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("MURAL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let reconcile_on_start = std::env::var("MURAL_RECONCILE_ON_START")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // Init database
    let db = Arc::new(mural_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: the dispatcher is built once here and handed to the
    // engine and the gateway route explicitly.
    let dispatcher = Dispatcher::new();
    let registry = BoardRegistry::new(db.clone());
    let engine = PlacementEngine::new(db.clone(), dispatcher.clone());
    let history = BoardHistory::new(db.clone());

    // Crash recovery: replay each board's log into the derived tables before
    // accepting traffic.
    if reconcile_on_start {
        info!("Reconciling projections from the history log");
        for board in registry.list()? {
            if let Err(e) = history.rebuild(board.id) {
                warn!("Reconciliation failed for board {}: {}", board.id, e);
            }
        }
    }

    let app_state: AppState = Arc::new(AppStateInner {
        registry,
        engine,
        history,
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let server_state = ServerState {
        dispatcher,
        jwt_secret,
    };

    // Routes: reads are public (visitor mode); writes require a valid token.
    let public_routes = Router::new()
        .route("/boards", get(boards::list_boards))
        .route("/boards/{board_id}", get(boards::get_board))
        .route("/boards/{board_id}/cells", get(boards::get_snapshot))
        .route("/boards/{board_id}/history", get(timeline::get_history))
        .route("/boards/{board_id}/history/state", get(timeline::get_state_at))
        .route("/boards/{board_id}/contributors", get(boards::list_contributors))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/boards", post(boards::create_board))
        .route("/boards/{board_id}/close", post(boards::close_board))
        .route("/boards/{board_id}/pixels", post(pixels::place_pixel))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(server_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Mural server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
