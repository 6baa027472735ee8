//! Per-connection session lifecycle.
//!
//! A session moves through `Pending → Admitted → Active → Closed`. The
//! upgrade handler performs the admission step; [`run_session`] registers
//! the connection, relays every inbound text frame to the broadcast
//! engine, and unregisters on the way out.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::app_state::AppState;
use crate::domain::Connection;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, secret not yet checked.
    Pending,
    /// Secret accepted, not yet registered.
    Admitted,
    /// Registered and receiving.
    Active,
    /// Terminated. Absorbing.
    Closed,
}

impl SessionState {
    /// Returns `true` if `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Admitted | Self::Closed)
                | (Self::Admitted, Self::Active | Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Admitted => "admitted",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle tracker for one accepted transport.
#[derive(Debug)]
pub struct Session {
    remote_addr: String,
    state: SessionState,
}

impl Session {
    /// Starts tracking a freshly accepted transport.
    #[must_use]
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            state: SessionState::Pending,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the peer address.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::debug!(
                remote_addr = %self.remote_addr,
                from = %self.state,
                to = %next,
                "ignored invalid session transition"
            );
            return false;
        }
        tracing::trace!(remote_addr = %self.remote_addr, from = %self.state, to = %next, "session transition");
        self.state = next;
        true
    }
}

/// Runs an admitted session until the peer leaves or the connection is
/// evicted.
///
/// - Registers the connection, then spawns a writer that drains its
///   outbound queue into the socket.
/// - Forwards every inbound text frame to the broadcast engine.
/// - On close, read error, or eviction: unregisters, closes the
///   connection and waits for the writer to close the socket.
pub async fn run_session(socket: WebSocket, state: AppState, mut session: Session) {
    let (conn, mut outbox) = Connection::new(session.remote_addr(), state.config.outbound_capacity);
    let conn = Arc::new(conn);
    let registry = Arc::clone(state.engine.registry());

    if let Err(err) = registry.add(Arc::clone(&conn)).await {
        tracing::error!(conn_id = %conn.id(), error = %err, "ws: registration failed");
        session.advance(SessionState::Closed);
        return;
    }
    session.advance(SessionState::Active);
    tracing::info!(conn_id = %conn.id(), remote_addr = %conn.remote_addr(), "ws: client registered");
    let pool = registry.addresses().await;
    tracing::info!(?pool, "ws: current connection pool");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_conn = Arc::clone(&conn);
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbox.next().await {
            if let Err(e) = ws_tx.send(Message::text(String::from(&*payload))).await {
                tracing::debug!(conn_id = %writer_conn.id(), error = %e, "ws: write failed");
                writer_conn.close();
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut close_signal = conn.close_signal();
    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(conn_id = %conn.id(), payload = %text.as_str(), "ws: recv");
                    state.engine.broadcast(Some(conn.id()), text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break "peer closed",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "ws: read failed");
                    break "read error";
                }
            },
            () = close_signal.closed() => break "evicted",
        }
    };

    registry.remove(conn.id()).await;
    conn.close();
    if writer.await.is_err() {
        tracing::warn!(conn_id = %conn.id(), "ws: writer task panicked");
    }
    session.advance(SessionState::Closed);

    tracing::info!(conn_id = %conn.id(), remote_addr = %conn.remote_addr(), reason, "ws: client unregistered");
    let pool = registry.addresses().await;
    tracing::info!(?pool, "ws: current connection pool");
}
