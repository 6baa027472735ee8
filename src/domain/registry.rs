//! Serialized set of live connections.
//!
//! [`ConnectionRegistry`] is the single source of truth for who is
//! currently connected. Every mutation and every broadcast-time read goes
//! through one [`tokio::sync::RwLock`], so a snapshot never observes a
//! half-applied `add` or `remove`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Connection, ConnectionId};
use crate::error::RelayError;

#[derive(Debug)]
struct Member {
    seq: u64,
    conn: Arc<Connection>,
}

#[derive(Debug, Default)]
struct Membership {
    next_seq: u64,
    members: HashMap<ConnectionId, Member>,
}

/// Membership of one relay room.
///
/// # Concurrency
///
/// - `add`, `remove` and `close_all` take the write lock.
/// - `snapshot`, `len` and `addresses` take the read lock.
/// - Snapshots are returned in registration order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Membership>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AlreadyRegistered`] if a connection with the
    /// same identity is already a member.
    pub async fn add(&self, conn: Arc<Connection>) -> Result<(), RelayError> {
        let id = conn.id();
        let mut inner = self.inner.write().await;
        if inner.members.contains_key(&id) {
            return Err(RelayError::AlreadyRegistered(id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.members.insert(id, Member { seq, conn });
        Ok(())
    }

    /// Unregisters a connection, returning it if it was a member.
    ///
    /// Removing a non-member is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner
            .write()
            .await
            .members
            .remove(&id)
            .map(|member| member.conn)
    }

    /// Returns the current members in registration order.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        let mut members: Vec<&Member> = inner.members.values().collect();
        members.sort_unstable_by_key(|member| member.seq);
        members
            .into_iter()
            .map(|member| Arc::clone(&member.conn))
            .collect()
    }

    /// Returns `true` if `id` is currently registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().await.members.contains_key(&id)
    }

    /// Returns the remote addresses of all members in registration order.
    pub async fn addresses(&self) -> Vec<String> {
        self.snapshot()
            .await
            .iter()
            .map(|conn| conn.remote_addr().to_string())
            .collect()
    }

    /// Returns the number of registered connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.members.len()
    }

    /// Returns `true` if nobody is connected.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.members.is_empty()
    }

    /// Unregisters and closes every member, returning how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Member> = {
            let mut inner = self.inner.write().await;
            inner.members.drain().map(|(_, member)| member).collect()
        };
        for member in &drained {
            member.conn.close();
        }
        drained.len()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Outbox;
    use std::collections::HashSet;

    fn make_conn(addr: &str) -> (Arc<Connection>, Outbox) {
        let (conn, outbox) = Connection::new(addr, 8);
        (Arc::new(conn), outbox)
    }

    fn ids(conns: &[Arc<Connection>]) -> Vec<ConnectionId> {
        conns.iter().map(|c| c.id()).collect()
    }

    #[tokio::test]
    async fn add_and_snapshot() {
        let registry = ConnectionRegistry::new();
        let (a, _oa) = make_conn("10.0.0.1:1");
        let (b, _ob) = make_conn("10.0.0.2:1");

        assert!(registry.add(Arc::clone(&a)).await.is_ok());
        assert!(registry.add(Arc::clone(&b)).await.is_ok());

        let snapshot = registry.snapshot().await;
        assert_eq!(ids(&snapshot), vec![a.id(), b.id()]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn re_add_is_rejected() {
        let registry = ConnectionRegistry::new();
        let (a, _oa) = make_conn("10.0.0.1:1");

        assert!(registry.add(Arc::clone(&a)).await.is_ok());
        let result = registry.add(Arc::clone(&a)).await;
        assert!(matches!(result, Err(RelayError::AlreadyRegistered(id)) if id == a.id()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn same_address_is_two_members() {
        let registry = ConnectionRegistry::new();
        let (a, _oa) = make_conn("10.0.0.1:1");
        let (b, _ob) = make_conn("10.0.0.1:1");

        let _ = registry.add(a).await;
        let _ = registry.add(b).await;
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.addresses().await, vec!["10.0.0.1:1", "10.0.0.1:1"]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (a, _oa) = make_conn("10.0.0.1:1");
        let (b, _ob) = make_conn("10.0.0.2:1");
        let _ = registry.add(Arc::clone(&a)).await;
        let _ = registry.add(Arc::clone(&b)).await;

        assert!(registry.remove(a.id()).await.is_some());
        assert!(registry.remove(a.id()).await.is_none());

        assert_eq!(ids(&registry.snapshot().await), vec![b.id()]);
    }

    #[tokio::test]
    async fn remove_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(registry.remove(ConnectionId::new()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn snapshot_is_read_only() {
        let registry = ConnectionRegistry::new();
        let (a, _oa) = make_conn("10.0.0.1:1");
        let _ = registry.add(a).await;

        let first = ids(&registry.snapshot().await);
        let second = ids(&registry.snapshot().await);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_keeps_registration_order_after_removal() {
        let registry = ConnectionRegistry::new();
        let conns: Vec<(Arc<Connection>, Outbox)> =
            (0..5).map(|i| make_conn(&format!("10.0.0.{i}:1"))).collect();
        for (conn, _) in &conns {
            let _ = registry.add(Arc::clone(conn)).await;
        }
        let Some((middle, _)) = conns.get(2) else {
            panic!("five connections expected");
        };
        registry.remove(middle.id()).await;

        let expected: Vec<ConnectionId> = conns
            .iter()
            .map(|(c, _)| c.id())
            .filter(|id| *id != middle.id())
            .collect();
        assert_eq!(ids(&registry.snapshot().await), expected);
    }

    #[tokio::test]
    async fn close_all_drains_and_closes() {
        let registry = ConnectionRegistry::new();
        let (a, _oa) = make_conn("10.0.0.1:1");
        let (b, _ob) = make_conn("10.0.0.2:1");
        let _ = registry.add(Arc::clone(&a)).await;
        let _ = registry.add(Arc::clone(&b)).await;

        assert_eq!(registry.close_all().await, 2);
        assert!(registry.is_empty().await);
        assert!(a.is_closed());
        assert!(b.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_are_linearized() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut outboxes = Vec::new();
        let mut keep = Vec::new();
        let mut drop_ids = Vec::new();
        let mut tasks = Vec::new();

        for i in 0..64 {
            let (conn, outbox) = make_conn(&format!("10.0.1.{i}:1"));
            outboxes.push(outbox);
            let remove_after = i % 2 == 0;
            if remove_after {
                drop_ids.push(conn.id());
            } else {
                keep.push(conn.id());
            }
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let _ = registry.add(Arc::clone(&conn)).await;
                let seen = registry.contains(conn.id()).await;
                if remove_after {
                    registry.remove(conn.id()).await;
                }
                seen
            }));
        }

        for task in tasks {
            let Ok(seen) = task.await else {
                panic!("registry task panicked");
            };
            assert!(seen, "a connection added before a read must be visible");
        }

        let snapshot = ids(&registry.snapshot().await);
        assert_eq!(snapshot.len(), keep.len());
        for id in &keep {
            assert!(snapshot.contains(id));
        }
        for id in &drop_ids {
            assert!(!snapshot.contains(id));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn snapshots_during_churn_are_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut outboxes = Vec::new();

        let mut stable = Vec::new();
        for i in 0..8 {
            let (conn, outbox) = make_conn(&format!("10.0.2.{i}:1"));
            outboxes.push(outbox);
            stable.push(conn.id());
            let _ = registry.add(conn).await;
        }
        let mut gone = Vec::new();
        for i in 0..8 {
            let (conn, outbox) = make_conn(&format!("10.0.3.{i}:1"));
            outboxes.push(outbox);
            gone.push(conn.id());
            let _ = registry.add(Arc::clone(&conn)).await;
            registry.remove(conn.id()).await;
        }
        let stable = Arc::new(stable);
        let gone = Arc::new(gone);

        let mut writers = Vec::new();
        for i in 0..32 {
            let (conn, outbox) = make_conn(&format!("10.0.4.{i}:1"));
            outboxes.push(outbox);
            let registry = Arc::clone(&registry);
            writers.push(tokio::spawn(async move {
                let _ = registry.add(Arc::clone(&conn)).await;
                let after_add = ids(&registry.snapshot().await).contains(&conn.id());
                registry.remove(conn.id()).await;
                let after_remove = ids(&registry.snapshot().await).contains(&conn.id());
                after_add && !after_remove
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let stable = Arc::clone(&stable);
            let gone = Arc::clone(&gone);
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = ids(&registry.snapshot().await);
                    let unique: HashSet<ConnectionId> = snapshot.iter().copied().collect();
                    let stable_seen: Vec<ConnectionId> = snapshot
                        .iter()
                        .copied()
                        .filter(|id| stable.contains(id))
                        .collect();
                    let consistent = unique.len() == snapshot.len()
                        && stable_seen == *stable
                        && !snapshot.iter().any(|id| gone.contains(id));
                    if !consistent {
                        return false;
                    }
                    tokio::task::yield_now().await;
                }
                true
            }));
        }

        for task in writers {
            let Ok(ok) = task.await else {
                panic!("writer task panicked");
            };
            assert!(ok, "a completed add or remove was not visible to the next snapshot");
        }
        for task in readers {
            let Ok(ok) = task.await else {
                panic!("reader task panicked");
            };
            assert!(ok, "snapshot observed a torn membership");
        }

        assert_eq!(ids(&registry.snapshot().await), *stable);
    }
}
