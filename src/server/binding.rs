//! Listener binding for [`GateServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use super::{Bound, GateServer, ServerError, ServerState, Unbound};

impl<S: ServerState> GateServer<S> {
    fn bind_to_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<GateServer<Bound>, ServerError> {
        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;
        Ok(GateServer {
            manager: self.manager,
            config: self.config,
            ready_tx: self.ready_tx,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }

    /// Bind to `addr`, replacing any previous listener.
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use gatewire::{config::ServerConfig, hooks::ConnectionHooks, server::GateServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let server = GateServer::new(ServerConfig::default(), ConnectionHooks::new().into_handler())
    ///     .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
    ///     .expect("bind failed");
    /// assert!(server.local_addr().is_some());
    /// # }
    /// ```
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<GateServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }

    /// Bind to an already open listener.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if configuring the listener fails.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<GateServer<Bound>, ServerError> {
        self.bind_to_listener(std_listener)
    }
}

impl GateServer<Unbound> {
    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl GateServer<Bound> {
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }
}
