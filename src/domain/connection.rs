//! Handle to one live WebSocket session.
//!
//! A [`Connection`] owns the sending side of a bounded outbound queue and a
//! close flag. The session that accepted the socket keeps the matching
//! [`Outbox`] and drains it into the socket from a dedicated writer task, so
//! delivering a broadcast never touches the socket directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};

use super::ConnectionId;
use crate::error::RelayError;

/// One accepted, admitted transport session.
///
/// Shared as `Arc<Connection>` between the registry, the broadcast engine
/// and the owning session. Closing is idempotent and may be triggered by
/// any of them.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: String,
    outbound: mpsc::Sender<Arc<str>>,
    closed: watch::Sender<bool>,
}

/// Receiving half of a [`Connection`]'s outbound queue.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Arc<str>>,
    closed: CloseSignal,
}

/// Observer of a [`Connection`]'s close flag.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl Connection {
    /// Creates a connection with an outbound queue of `capacity` payloads.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(remote_addr: impl Into<String>, capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);
        let conn = Self {
            id: ConnectionId::new(),
            remote_addr: remote_addr.into(),
            outbound: tx,
            closed: closed_tx,
        };
        let outbox = Outbox {
            rx,
            closed: CloseSignal { rx: closed_rx },
        };
        (conn, outbox)
    }

    /// Returns the connection identity.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the peer address, for diagnostics only.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Queues `payload` for the peer, waiting at most `timeout` for room.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the connection is closed, the
    /// writer has gone away, or the queue stayed full past `timeout`.
    pub async fn deliver(&self, payload: Arc<str>, timeout: Duration) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::Transport(format!(
                "connection {} is closed",
                self.id
            )));
        }
        self.outbound
            .send_timeout(payload, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => RelayError::Transport(format!(
                    "write to {} timed out after {} ms",
                    self.remote_addr,
                    timeout.as_millis()
                )),
                SendTimeoutError::Closed(_) => RelayError::Transport(format!(
                    "writer for {} has gone away",
                    self.remote_addr
                )),
            })
    }

    /// Marks the connection closed, waking its session and writer.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Returns `true` once [`Connection::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Returns an observer of the close flag.
    #[must_use]
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal {
            rx: self.closed.subscribe(),
        }
    }
}

impl Outbox {
    /// Waits for the next queued payload.
    ///
    /// Returns `None` once the connection is closed or dropped; payloads
    /// still queued at that point are discarded.
    pub async fn next(&mut self) -> Option<Arc<str>> {
        if self.closed.is_closed() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.closed.closed() => None,
            payload = self.rx.recv() => payload,
        }
    }
}

impl CloseSignal {
    /// Returns `true` once the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the connection is closed or dropped.
    ///
    /// Holds no watch guard across an await.
    pub async fn closed(&mut self) {
        loop {
            let closed = *self.rx.borrow_and_update();
            if closed || self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
