//! Application callbacks invoked by the connection engine.
//!
//! [`ConnectionHandler`] is the interface the owning gateway implements.
//! [`ConnectionHooks`] builds a handler from individual closures, which is
//! convenient for tests and small binaries.
//!
//! Every callback runs synchronously on a pump task and must return promptly;
//! a slow `on_receive` stalls reads for that connection.

use std::{error::Error, sync::Arc};

use bytes::Bytes;

use crate::{connection::Connection, session::MessageKind};

/// Error type returned by [`ConnectionHandler::on_receive`].
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Result of [`ConnectionHandler::on_receive`].
///
/// `Ok(Some(reply))` pushes `reply` back onto the same connection.
pub type ReceiveResult = Result<Option<Bytes>, HandlerError>;

/// Callbacks supplied by the owning gateway.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once after the connection is registered with its manager.
    fn on_connect(&self, _conn: &Connection) {}

    /// Called for every non-empty inbound frame.
    ///
    /// # Errors
    ///
    /// An error is logged by the read pump; the connection stays open.
    fn on_receive(&self, _conn: &Connection, _payload: Bytes, _kind: MessageKind) -> ReceiveResult {
        Ok(None)
    }

    /// Called exactly once after the connection has reached `Closed`.
    fn on_disconnect(&self, _conn: &Connection) {}
}

type ConnectHook = Box<dyn Fn(&Connection) + Send + Sync + 'static>;
type ReceiveHook = Box<dyn Fn(&Connection, Bytes, MessageKind) -> ReceiveResult + Send + Sync>;

/// Closure-based [`ConnectionHandler`].
///
/// ```
/// use gatewire::hooks::ConnectionHooks;
///
/// let hooks = ConnectionHooks::new()
///     .on_receive(|_conn, payload, _kind| Ok(Some(payload)))
///     .on_disconnect(|conn| log::info!("{} gone", conn.id()));
/// # let _ = hooks;
/// ```
#[derive(Default)]
pub struct ConnectionHooks {
    on_connect: Option<ConnectHook>,
    on_receive: Option<ReceiveHook>,
    on_disconnect: Option<ConnectHook>,
}

impl ConnectionHooks {
    /// Create an empty hook table. Unset callbacks do nothing.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register the connect callback.
    #[must_use]
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// Register the receive callback.
    #[must_use]
    pub fn on_receive<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection, Bytes, MessageKind) -> ReceiveResult + Send + Sync + 'static,
    {
        self.on_receive = Some(Box::new(f));
        self
    }

    /// Register the disconnect callback.
    #[must_use]
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    /// Wrap the table for sharing with a manager.
    #[must_use]
    pub fn into_handler(self) -> Arc<dyn ConnectionHandler> { Arc::new(self) }
}

impl ConnectionHandler for ConnectionHooks {
    fn on_connect(&self, conn: &Connection) {
        if let Some(f) = &self.on_connect {
            f(conn);
        }
    }

    fn on_receive(&self, conn: &Connection, payload: Bytes, kind: MessageKind) -> ReceiveResult {
        match &self.on_receive {
            Some(f) => f(conn, payload, kind),
            None => Ok(None),
        }
    }

    fn on_disconnect(&self, conn: &Connection) {
        if let Some(f) = &self.on_disconnect {
            f(conn);
        }
    }
}
