//! Identifiers and state shared across the connection engine.
//!
//! [`ConnectionId`] names one socket inside a [`crate::manager::ConnectionManager`];
//! [`SessionKind`] selects whether a cluster request targets a connection id or
//! an application user id.

use std::fmt;

/// Identifier assigned to a connection.
///
/// Ids are allocated from 1 upward and never reused within one manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(i64);

impl From<i64> for ConnectionId {
    fn from(value: i64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: i64) -> Self { Self(id) }

    /// Return the inner `i64` representation.
    #[must_use]
    pub const fn as_i64(&self) -> i64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Lifecycle state of a connection.
///
/// Transitions only move forward: `Opened -> Hanged -> Closed` or
/// `Opened -> Closed`. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    /// Normal duplex operation.
    Opened,
    /// Graceful shutdown in progress.
    Hanged,
    /// Terminal state; the socket has been released.
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Opened => "opened",
            Self::Hanged => "hanged",
            Self::Closed => "closed",
        })
    }
}

/// How a provider target should be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// The target is a connection id.
    Conn,
    /// The target is a bound user id.
    User,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conn => "conn",
            Self::User => "user",
        })
    }
}

/// Type tag delivered with every inbound payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageKind {
    /// Opaque binary payload.
    #[default]
    Binary,
}
