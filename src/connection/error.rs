//! Errors returned by connection operations and the reasons a connection closes.

use std::{fmt, io};

use thiserror::Error;

/// Errors returned synchronously to callers of [`super::Connection`] operations.
///
/// None of these are fatal to the connection itself.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A graceful close is in progress.
    #[error("connection is hanged")]
    Hanged,
    /// The connection has reached its terminal state.
    #[error("connection is closed")]
    Closed,
    /// The outbound queue stayed full for longer than the caller may wait.
    #[error("outbound queue full")]
    QueueFull,
    /// The transport does not report the requested address.
    #[error("address unavailable")]
    AddressUnavailable,
    /// The write pump failed to write the frame.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    /// The write pump did not confirm the frame within the push timeout.
    #[error("write not acknowledged in time")]
    WriteTimeout,
}

impl ConnectionError {
    /// Returns `true` for the state errors `Hanged` and `Closed`.
    #[must_use]
    pub const fn is_state_error(&self) -> bool { matches!(self, Self::Hanged | Self::Closed) }
}

/// Which pump an event concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The read pump.
    Inbound,
    /// The write pump.
    Outbound,
}

impl Direction {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Why a connection reached `Closed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Queued frames were flushed before the socket closed.
    Graceful,
    /// A caller forced the connection closed.
    Forced,
    /// The peer closed the stream at a frame boundary.
    PeerClosed,
    /// Reading failed with a fatal transport or protocol error.
    ReadError(String),
    /// The peer was silent for two heartbeat intervals.
    HeartbeatTimeout,
    /// A blocked pump was not released in time.
    BlockTimeout(Direction),
    /// A pump panicked.
    PumpPanic(Direction),
    /// The owning server shut down.
    ServerShutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graceful => f.write_str("graceful"),
            Self::Forced => f.write_str("forced"),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::BlockTimeout(dir) => write!(f, "{dir} block timeout"),
            Self::PumpPanic(dir) => write!(f, "{dir} pump panicked"),
            Self::ServerShutdown => f.write_str("server shutdown"),
        }
    }
}
