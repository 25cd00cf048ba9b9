//! Tokio-based TCP acceptor feeding a [`ConnectionManager`].
//!
//! `GateServer` spawns worker tasks that accept TCP connections and hand each
//! socket to the manager, which starts the connection's pumps. When the server
//! stops it closes every live connection, gracefully first and then by force
//! once `shutdown_timeout` has passed.

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{config::ServerConfig, hooks::ConnectionHandler, manager::ConnectionManager};

mod binding;
pub mod error;
mod runtime;
#[cfg(test)]
pub(crate) mod test_util;

pub use error::ServerError;

pub use crate::config::BackoffConfig;

/// TCP front end of a gateway.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (no listener yet) or [`Bound`]. Only bound servers can run.
pub struct GateServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) manager: ConnectionManager,
    pub(crate) config: ServerConfig,
    /// Notified once all accept workers have been spawned.
    ///
    /// A `oneshot::Sender` fires once, so a new one must be supplied for
    /// every run.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

impl GateServer<Unbound> {
    /// Create a server whose connections report to `handler`.
    ///
    /// ```
    /// use gatewire::{config::ServerConfig, hooks::ConnectionHooks, server::GateServer};
    ///
    /// let server = GateServer::new(ServerConfig::default(), ConnectionHooks::new().into_handler());
    /// assert!(server.manager().is_empty());
    /// ```
    #[must_use]
    pub fn new(config: ServerConfig, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            manager: ConnectionManager::new(config.connection, handler),
            config,
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<S: ServerState> GateServer<S> {
    /// Set the number of accept workers. Zero is raised to one.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count.max(1);
        self
    }

    /// Replace the accept back-off.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff.normalized();
        self
    }

    /// Notify `tx` once the server is accepting.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Number of accept workers.
    #[must_use]
    pub fn worker_count(&self) -> usize { self.config.workers }

    /// Manager holding every connection accepted by this server.
    ///
    /// Clone it before running the server to route pushes from elsewhere.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager { &self.manager }
}
