//! Mutable fields of a connection, guarded together by one mutex.

use tokio::time::Instant;

use super::CloseReason;
use crate::session::ConnState;

/// Everything about a connection that changes after construction.
///
/// State transitions, uid changes, and index updates in the manager all
/// happen while this struct is locked.
pub(super) struct Shared {
    pub(super) state: ConnState,
    pub(super) uid: i64,
    pub(super) last_heartbeat: Instant,
    pub(super) close_reason: Option<CloseReason>,
}

impl Shared {
    pub(super) fn new() -> Self {
        Self {
            state: ConnState::Opened,
            uid: 0,
            last_heartbeat: Instant::now(),
            close_reason: None,
        }
    }

    /// Move `Opened` to `Hanged` for a graceful close.
    pub(super) fn begin_hang(&mut self) -> Result<(), super::ConnectionError> {
        match self.state {
            ConnState::Opened => {
                self.state = ConnState::Hanged;
                Ok(())
            }
            ConnState::Hanged => Err(super::ConnectionError::Hanged),
            ConnState::Closed => Err(super::ConnectionError::Closed),
        }
    }

    /// Move to `Closed`, recording `reason`. Returns `false` if already closed.
    pub(super) fn finish(&mut self, reason: CloseReason) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }
        self.state = ConnState::Closed;
        self.close_reason = Some(reason);
        true
    }

    pub(super) fn check_open(&self) -> Result<(), super::ConnectionError> {
        match self.state {
            ConnState::Opened => Ok(()),
            ConnState::Hanged => Err(super::ConnectionError::Hanged),
            ConnState::Closed => Err(super::ConnectionError::Closed),
        }
    }
}
