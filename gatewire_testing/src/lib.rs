//! Utilities for driving `gatewire` connections during tests.
//!
//! The helpers pair an in-memory [`tokio::io::duplex`] stream with a framed
//! client, so tests can act as the remote peer of a
//! [`Connection`](gatewire::Connection) without opening sockets.
//!
//! ```rust
//! use gatewire::{ConnectionConfig, ConnectionHooks, ConnectionManager};
//! use gatewire_testing::duplex_peer;
//!
//! # async fn example() {
//! let manager = ConnectionManager::new(
//!     ConnectionConfig::default(),
//!     ConnectionHooks::new().into_handler(),
//! );
//! let (transport, mut client) = duplex_peer();
//! let conn = manager.accept(transport);
//! conn.push("hi").await.unwrap();
//! assert_eq!(&client.recv().await.unwrap()[..], b"hi");
//! # }
//! ```

pub mod client;
pub mod handler;
pub mod logging;
pub mod macros;
pub mod metrics;

pub use client::{TestClient, duplex_peer, duplex_peer_with, peer_addr};
pub use handler::{HookEvent, RecordingHandler};
pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricsCapture, counter_value};
