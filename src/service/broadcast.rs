//! Broadcast engine: fans one message out to the whole room.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::domain::{Connection, ConnectionId, ConnectionRegistry};
use crate::error::RelayError;

/// Default time a single member may take to accept a payload.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivery policy for [`BroadcastEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// Per-member delivery timeout. A member that cannot accept the
    /// payload in time is evicted.
    pub write_timeout: Duration,
    /// Whether the sender receives its own message.
    pub echo_to_sender: bool,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            echo_to_sender: true,
        }
    }
}

/// Outcome of a single [`BroadcastEngine::broadcast`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of members the payload was handed to.
    pub delivered: usize,
    /// Members that failed and were removed from the registry.
    pub evicted: Vec<ConnectionId>,
}

/// Delivers messages to every registered connection.
///
/// Reads membership through [`ConnectionRegistry::snapshot`] and only
/// mutates it to evict members whose delivery failed. A failing member
/// never prevents delivery to the rest of the room.
#[derive(Debug, Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    options: BroadcastOptions,
}

impl BroadcastEngine {
    /// Creates a new `BroadcastEngine` over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, options: BroadcastOptions) -> Self {
        Self { registry, options }
    }

    /// Returns a reference to the inner [`ConnectionRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Delivers `message` to the current membership.
    ///
    /// `origin` identifies the sending session; it is skipped only when
    /// `echo_to_sender` is off. Deliveries run concurrently, each bounded
    /// by the write timeout.
    pub async fn broadcast(&self, origin: Option<ConnectionId>, message: &str) -> BroadcastReport {
        let targets: Vec<Arc<Connection>> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|conn| self.options.echo_to_sender || Some(conn.id()) != origin)
            .collect();

        let report = self.deliver_to(&targets, Arc::from(message)).await;
        tracing::debug!(
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "broadcast complete"
        );
        report
    }

    async fn deliver_to(&self, targets: &[Arc<Connection>], payload: Arc<str>) -> BroadcastReport {
        let timeout = self.options.write_timeout;
        let results = join_all(targets.iter().map(|conn| {
            let payload = Arc::clone(&payload);
            async move { conn.deliver(payload, timeout).await }
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (conn, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    if self.evict(conn, &err).await {
                        report.evicted.push(conn.id());
                    }
                }
            }
        }
        report
    }

    /// Removes `conn` after a failed delivery. Returns `false` if it had
    /// already left the registry on its own.
    async fn evict(&self, conn: &Connection, err: &RelayError) -> bool {
        conn.close();
        if self.registry.remove(conn.id()).await.is_none() {
            tracing::debug!(conn_id = %conn.id(), error = %err, "delivery to departed connection skipped");
            return false;
        }
        tracing::warn!(
            conn_id = %conn.id(),
            remote_addr = %conn.remote_addr(),
            error = %err,
            "evicted connection after failed delivery"
        );
        true
    }
}
