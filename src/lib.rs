#![doc(html_root_url = "https://docs.rs/gatewire/latest")]
//! Public API for the `gatewire` library.
//!
//! `gatewire` is the connection layer of a long-connection gateway. Each
//! accepted socket becomes a [`Connection`] driven by a read pump, a write
//! pump and a supervisor. Connections live in a [`ConnectionManager`] that
//! indexes them by id and by bound user id, and a [`GateProvider`] exposes
//! the operations cluster services call: push, multicast, broadcast,
//! disconnect, and session handoff.

pub mod codec;
pub mod config;
pub mod connection;
pub mod hooks;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod panic;
pub mod provider;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{ConnectionConfig, ServerConfig, Settings};
pub use connection::{CloseReason, Connection, ConnectionError};
pub use hooks::{ConnectionHandler, ConnectionHooks};
pub use manager::ConnectionManager;
pub use provider::{GateError, GateProvider};
pub use server::{GateServer, ServerError};
pub use session::{ConnState, ConnectionId, MessageKind, SessionKind};
pub use transport::{StreamTransport, Transport};
