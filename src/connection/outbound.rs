//! Items carried by the outbound queue.

use bytes::Bytes;
use tokio::sync::oneshot;

use super::ConnectionError;

/// Acknowledgement sent once the write pump has attempted a frame.
pub(super) type Ack = oneshot::Sender<Result<(), ConnectionError>>;

/// One entry of the outbound FIFO.
pub(super) enum Outbound {
    /// A payload to frame and write. `ack` is set by `send`.
    Data { payload: Bytes, ack: Option<Ack> },
    /// Flush marker enqueued by a graceful close; nothing after it is written.
    Close,
}

impl Outbound {
    pub(super) fn data(payload: Bytes) -> Self { Self::Data { payload, ack: None } }
}

/// Report the outcome of a write to whoever is waiting on it.
pub(super) fn acknowledge(ack: Option<Ack>, result: Result<(), ConnectionError>) {
    if let Some(ack) = ack {
        // The sender may have stopped waiting.
        let _ = ack.send(result);
    }
}
