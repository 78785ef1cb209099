pub mod agents;
pub mod card;
pub mod config;
pub mod deck;
pub mod error;
pub mod event_log;
pub mod eval;
pub mod http;
pub mod lifecycle;
pub mod lock;
pub mod manager;
pub mod registry;
pub mod session;
pub mod state;
pub mod table;
pub mod timers;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Assembles the full router over a pre-built `AppState`. Split out from
/// `main` so integration tests can mount the same routes over a test
/// `AppState` without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::health))
        .route("/v1/agents", post(http::register_agent))
        .route("/v1/tables", get(http::list_tables))
        .route("/v1/tables/:tableId", get(http::get_table))
        .route("/v1/tables/:tableId/events", get(http::get_events))
        .route("/v1/tables/:tableId/join", post(http::join_table))
        .route("/v1/tables/:tableId/leave", post(http::leave_table))
        .route("/v1/ws", get(ws::player_ws))
        .route("/v1/ws/observe/:tableId", get(ws::observe_ws))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
