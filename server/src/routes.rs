use axum::{extract::State, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router: the WebSocket endpoint plus a health check.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint (auth via handshake headers)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// GET /health
/// Local connection count and the registry store's connectivity.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.connections.len(),
        "registry": state.registry.status(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    }))
}
