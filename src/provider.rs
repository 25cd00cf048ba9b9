//! Cluster-facing operations on a gateway's connections.
//!
//! [`GateProvider`] is what a remote service's RPC layer calls into. Each
//! operation resolves its target through the [`ConnectionManager`] by
//! connection id or by bound uid ([`SessionKind`]) and then delegates to the
//! matching [`Connection`] operation.

use std::net::IpAddr;

use bytes::Bytes;
use log::info;
use thiserror::Error;

use crate::{
    connection::{Connection, ConnectionError},
    manager::ConnectionManager,
    session::{ConnectionId, SessionKind},
};

/// Errors returned by [`GateProvider`] operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// No live connection matches the target.
    #[error("session not found: kind={kind}, target={target}")]
    SessionNotFound {
        /// How the target was interpreted.
        kind: SessionKind,
        /// Connection id or uid that was looked up.
        target: i64,
    },
    /// The connection rejected the operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Provider surface mapped onto a [`ConnectionManager`].
#[derive(Clone)]
pub struct GateProvider {
    manager: ConnectionManager,
}

impl GateProvider {
    /// Serve requests against `manager`.
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self { Self { manager } }

    /// The manager this provider routes through.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager { &self.manager }

    fn lookup(&self, kind: SessionKind, target: i64) -> Result<Connection, GateError> {
        let found = match kind {
            SessionKind::Conn => self.manager.get(ConnectionId::new(target)),
            SessionKind::User => self.manager.get_by_uid(target),
        };
        found.ok_or(GateError::SessionNotFound { kind, target })
    }

    /// Bind connection `cid` to user `uid`.
    ///
    /// # Errors
    ///
    /// [`GateError::SessionNotFound`] if `cid` is not registered.
    pub fn bind(&self, cid: i64, uid: i64) -> Result<(), GateError> {
        self.lookup(SessionKind::Conn, cid)?.bind(uid);
        Ok(())
    }

    /// Remove the binding of user `uid`.
    ///
    /// # Errors
    ///
    /// [`GateError::SessionNotFound`] if no connection is bound to `uid`.
    pub fn unbind(&self, uid: i64) -> Result<(), GateError> {
        self.lookup(SessionKind::User, uid)?.unbind();
        Ok(())
    }

    /// Remote IP of the target.
    ///
    /// # Errors
    ///
    /// [`GateError::SessionNotFound`] or the connection's address error.
    pub fn get_ip(&self, kind: SessionKind, target: i64) -> Result<IpAddr, GateError> {
        Ok(self.lookup(kind, target)?.remote_ip()?)
    }

    /// Connection id of the target.
    ///
    /// # Errors
    ///
    /// [`GateError::SessionNotFound`] if the target is not online.
    pub fn get_id(&self, kind: SessionKind, target: i64) -> Result<ConnectionId, GateError> {
        Ok(self.lookup(kind, target)?.id())
    }

    /// Whether the target has a registered connection.
    #[must_use]
    pub fn is_online(&self, kind: SessionKind, target: i64) -> bool {
        self.lookup(kind, target).is_ok()
    }

    /// Count sessions: all connections for [`SessionKind::Conn`], bound ones
    /// for [`SessionKind::User`].
    #[must_use]
    pub fn stat(&self, kind: SessionKind) -> usize {
        match kind {
            SessionKind::Conn => self.manager.len(),
            SessionKind::User => self.manager.bound_len(),
        }
    }

    /// Enqueue `message` for the target, waiting at most the push timeout for
    /// queue space.
    ///
    /// # Errors
    ///
    /// [`GateError::SessionNotFound`] or the connection's push error.
    pub async fn push(
        &self,
        kind: SessionKind,
        target: i64,
        message: Bytes,
    ) -> Result<(), GateError> {
        let conn = self.lookup(kind, target)?;
        conn.push(message).await?;
        Ok(())
    }

    /// Enqueue `message` for each online target. Returns how many accepted it.
    #[must_use]
    pub fn multicast(&self, kind: SessionKind, targets: &[i64], message: &Bytes) -> usize {
        match kind {
            SessionKind::Conn => {
                let ids: Vec<ConnectionId> =
                    targets.iter().copied().map(ConnectionId::new).collect();
                self.manager.multicast(&ids, message)
            }
            SessionKind::User => self
                .bound(targets)
                .filter(|conn| conn.try_push(message.clone()).is_ok())
                .count(),
        }
    }

    /// Enqueue `message` for every connection ([`SessionKind::Conn`]) or every
    /// bound connection ([`SessionKind::User`]). Returns how many accepted it.
    #[must_use]
    pub fn broadcast(&self, kind: SessionKind, message: &Bytes) -> usize {
        match kind {
            SessionKind::Conn => self.manager.broadcast(message),
            SessionKind::User => self
                .manager
                .bound_snapshot()
                .iter()
                .filter(|conn| conn.try_push(message.clone()).is_ok())
                .count(),
        }
    }

    /// Close the target, flushing its queue unless `force` is set.
    ///
    /// # Errors
    ///
    /// [`GateError::SessionNotFound`] or the connection's close error.
    pub async fn disconnect(
        &self,
        kind: SessionKind,
        target: i64,
        force: bool,
    ) -> Result<(), GateError> {
        let conn = self.lookup(kind, target)?;
        conn.close(force).await?;
        Ok(())
    }

    /// Pause traffic of the users in `targets` while their sessions move from
    /// `old_node` to `new_node`. Unknown users are ignored.
    pub fn block(&self, old_node: &str, new_node: &str, targets: &[i64]) {
        for conn in self.bound(targets) {
            info!(
                "blocking session for handoff: uid={}, id={}, old_node={old_node}, \
                 new_node={new_node}",
                conn.uid(),
                conn.id()
            );
            conn.block();
        }
    }

    /// Resume traffic of the users in `targets`. Unknown users are ignored.
    pub fn release(&self, targets: &[i64]) {
        for conn in self.bound(targets) {
            info!("releasing session: uid={}, id={}", conn.uid(), conn.id());
            conn.release();
        }
    }

    fn bound<'a>(&'a self, uids: &'a [i64]) -> impl Iterator<Item = Connection> + 'a {
        uids.iter().filter_map(|uid| self.manager.get_by_uid(*uid))
    }
}
