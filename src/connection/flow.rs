//! Block/release flow control shared by both pumps.
//!
//! Each pump owns a small control channel. A `Block` makes the pump stop
//! consuming its source and wait in [`hold`] until a `Release` arrives or the
//! block deadline passes. The two pumps are timed independently.

use std::time::Duration;

use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;

/// Capacity of each pump's control channel.
pub(super) const CONTROL_CAPACITY: usize = 4;

/// Instruction delivered to a pump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum FlowSignal {
    Block,
    Release,
}

/// Outcome of waiting in [`hold`].
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Hold {
    Released,
    TimedOut,
    Shutdown,
}

/// Wait for a release, the block deadline, or connection shutdown.
///
/// A repeated `Block` while held does not extend the deadline.
pub(super) async fn hold(
    control: &mut mpsc::Receiver<FlowSignal>,
    shutdown: &CancellationToken,
    timeout: Duration,
) -> Hold {
    let deadline = sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => return Hold::Shutdown,
            signal = control.recv() => match signal {
                Some(FlowSignal::Release) => return Hold::Released,
                Some(FlowSignal::Block) => {}
                None => return Hold::Shutdown,
            },
            () = &mut deadline => return Hold::TimedOut,
        }
    }
}
