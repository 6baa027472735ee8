//! HTTP API layer. The relay exposes a single plain HTTP endpoint,
//! `GET /health`; everything else happens over the WebSocket.

pub mod health;

use axum::Router;

use crate::app_state::AppState;

/// Builds the router with all plain HTTP endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new().merge(health::routes())
}
