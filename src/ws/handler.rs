//! Axum WebSocket upgrade handler for the registration path.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::{IntoResponse, Response};

use super::admission::{AdmissionParams, admit};
use super::session::{Session, SessionState, run_session};
use crate::app_state::AppState;

/// `GET <path>?pwd=<secret>` — check the room secret, then upgrade.
///
/// A wrong or missing secret on a private room is answered with `401`
/// before the upgrade, so the session never registers.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(params): Query<AdmissionParams>,
) -> Response {
    let mut session = Session::new(remote.to_string());

    if let Err(err) = admit(&state.config.password, params.pwd.as_deref()) {
        tracing::warn!(remote_addr = %remote, "ws: client connection failed: incorrect password");
        session.advance(SessionState::Closed);
        return err.into_response();
    }
    session.advance(SessionState::Admitted);

    ws.protocols(state.config.subprotocols.clone())
        .on_upgrade(move |socket| run_session(socket, state, session))
}
