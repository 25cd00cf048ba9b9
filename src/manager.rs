//! Registry of live connections.
//!
//! [`ConnectionManager`] allocates ids, indexes connections by id and by bound
//! uid, and routes pushes to one, several, or all of them. It is an explicitly
//! constructed object; nothing in the crate keeps a global table.
//!
//! Lock order: a connection's own mutex may be held while touching the maps,
//! never the other way round. Routing methods copy handles out of the maps
//! before doing any I/O.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, info, warn};

use crate::{
    config::ConnectionConfig,
    connection::{Connection, ConnectionParts, supervisor},
    hooks::ConnectionHandler,
    session::ConnectionId,
    transport::Transport,
};

/// Shared maps behind a [`ConnectionManager`].
///
/// Connections keep a weak reference to it so their close path can recycle
/// their entries.
#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicI64,
    by_id: DashMap<ConnectionId, Connection>,
    by_uid: DashMap<i64, Connection>,
}

impl Registry {
    fn allocate_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Move `conn` from `previous` to `uid` in the uid index.
    ///
    /// Called with the connection's mutex held.
    pub(crate) fn rebind(&self, conn: &Connection, previous: i64, uid: i64) {
        let id = conn.id();
        if previous != 0 && previous != uid {
            self.by_uid.remove_if(&previous, |_, c| c.id() == id);
        }
        if uid != 0 {
            self.by_uid.insert(uid, conn.clone());
        }
    }

    /// Drop every entry for connection `id`.
    ///
    /// Called with the connection's mutex held, in the same critical section
    /// that moves it to `Closed`.
    pub(crate) fn recycle(&self, id: ConnectionId, uid: i64) {
        self.by_id.remove(&id);
        if uid != 0 {
            self.by_uid.remove_if(&uid, |_, c| c.id() == id);
        }
        debug!("connection recycled: id={id}, uid={uid}");
    }
}

/// Owner of every live [`Connection`] accepted by a gateway.
#[derive(Clone)]
pub struct ConnectionManager {
    registry: Arc<Registry>,
    handler: Arc<dyn ConnectionHandler>,
    config: ConnectionConfig,
}

impl ConnectionManager {
    /// Create a manager whose connections use `config` and report to `handler`.
    #[must_use]
    pub fn new(config: ConnectionConfig, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            handler,
            config: config.normalized(),
        }
    }

    /// Configuration applied to new connections.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }

    /// Register a new connection on `transport` and start its pumps.
    ///
    /// The connect hook runs on the connection's own task before any frame is
    /// read.
    pub fn accept<T: Transport>(&self, transport: T) -> Connection {
        let id = self.registry.allocate_id();
        let (conn, channels) = Connection::new(ConnectionParts {
            id,
            config: self.config,
            local_addr: transport.local_addr(),
            peer_addr: transport.peer_addr(),
            handler: Arc::clone(&self.handler),
            registry: Arc::downgrade(&self.registry),
        });
        self.registry.by_id.insert(id, conn.clone());
        supervisor::spawn(conn.clone(), transport, channels);
        conn
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.registry.by_id.get(&id).map(|entry| entry.value().clone())
    }

    /// Look up the connection bound to `uid`.
    #[must_use]
    pub fn get_by_uid(&self, uid: i64) -> Option<Connection> {
        self.registry
            .by_uid
            .get(&uid)
            .map(|entry| entry.value().clone())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.registry.by_id.len() }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.registry.by_id.is_empty() }

    /// Number of connections bound to a uid.
    #[must_use]
    pub fn bound_len(&self) -> usize { self.registry.by_uid.len() }

    /// Copy out every registered connection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Connection> {
        self.registry
            .by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Copy out every connection bound to a uid.
    #[must_use]
    pub fn bound_snapshot(&self) -> Vec<Connection> {
        self.registry
            .by_uid
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Enqueue `payload` on each connection in `ids` that is registered.
    ///
    /// Returns how many connections accepted the frame.
    pub fn multicast(&self, ids: &[ConnectionId], payload: &Bytes) -> usize {
        let targets: Vec<Connection> = ids.iter().filter_map(|id| self.get(*id)).collect();
        push_all(&targets, payload)
    }

    /// Enqueue `payload` on every registered connection.
    ///
    /// Returns how many connections accepted the frame.
    pub fn broadcast(&self, payload: &Bytes) -> usize { push_all(&self.snapshot(), payload) }

    /// Close every registered connection and wait for their teardown.
    pub async fn close_all(&self, force: bool) {
        let conns = self.snapshot();
        info!("closing connections: count={}, force={force}", conns.len());
        futures::future::join_all(conns.iter().map(|c| async move {
            match c.close(force).await {
                // Already hanged or closed: wait for that teardown instead.
                Err(e) if e.is_state_error() => c.wait_closed().await,
                Err(e) => warn!("close failed: id={}, error={e}", c.id()),
                Ok(()) => {}
            }
        }))
        .await;
    }
}

/// Non-blocking push to each target, counting successes.
fn push_all(targets: &[Connection], payload: &Bytes) -> usize {
    targets
        .iter()
        .filter(|conn| match conn.try_push(payload.clone()) {
            Ok(()) => true,
            Err(e) => {
                debug!("push skipped: id={}, error={e}", conn.id());
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tokio::io::DuplexStream;

    use super::*;
    use crate::{hooks::ConnectionHooks, transport::StreamTransport};

    fn duplex_transport(capacity: usize) -> (StreamTransport<DuplexStream>, DuplexStream) {
        let (server, client) = tokio::io::duplex(capacity);
        (StreamTransport::new(server), client)
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::new(ConnectionConfig::default(), ConnectionHooks::new().into_handler())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_get_distinct_ids() {
        let manager = manager();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                let mut peers = Vec::new();
                for _ in 0..32 {
                    let (transport, peer) = duplex_transport(1024);
                    ids.push(manager.accept(transport).id());
                    peers.push(peer);
                }
                (ids, peers)
            }));
        }

        let mut seen = HashSet::new();
        let mut peers = Vec::new();
        for task in tasks {
            let (ids, p) = task.await.expect("accept task");
            for id in ids {
                assert!(seen.insert(id), "duplicate id {id}");
            }
            peers.extend(p);
        }
        assert_eq!(seen.len(), 256);
        assert_eq!(manager.len(), 256);
        assert!(seen.iter().all(|id| id.as_i64() >= 1));
        manager.close_all(true).await;
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let manager = manager();
        let (a, _pa) = duplex_transport(64);
        let (b, _pb) = duplex_transport(64);
        let first = manager.accept(a);
        let second = manager.accept(b);
        assert_eq!(first.id(), ConnectionId::new(1));
        assert_eq!(second.id(), ConnectionId::new(2));
        manager.close_all(true).await;
    }

    #[tokio::test]
    async fn bind_indexes_and_rebinding_moves_entry() {
        let manager = manager();
        let (t, _peer) = duplex_transport(64);
        let conn = manager.accept(t);

        conn.bind(42);
        assert_eq!(manager.get_by_uid(42).map(|c| c.id()), Some(conn.id()));

        conn.bind(43);
        assert!(manager.get_by_uid(42).is_none());
        assert_eq!(manager.get_by_uid(43).map(|c| c.id()), Some(conn.id()));

        conn.unbind();
        assert!(manager.get_by_uid(43).is_none());
        assert_eq!(conn.uid(), 0);
        manager.close_all(true).await;
    }

    #[tokio::test]
    async fn recycle_keeps_uid_claimed_by_newer_connection() {
        let manager = manager();
        let (ta, _pa) = duplex_transport(64);
        let (tb, _pb) = duplex_transport(64);
        let old = manager.accept(ta);
        let new = manager.accept(tb);
        old.bind(7);
        new.bind(7);

        old.close(true).await.expect("close old");
        assert_eq!(manager.get_by_uid(7).map(|c| c.id()), Some(new.id()));
        assert!(manager.get(old.id()).is_none());
        manager.close_all(true).await;
    }
}
