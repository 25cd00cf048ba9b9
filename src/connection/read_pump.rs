//! Read pump: decodes inbound frames and dispatches them to the receive hook.

use log::{debug, warn};
use tokio::sync::mpsc;

use super::{
    CloseReason,
    Connection,
    Direction,
    flow::{self, FlowSignal, Hold},
    supervisor::PumpExit,
};
use crate::{
    session::ConnState,
    transport::{FrameRead, InboundFrame},
};

pub(super) async fn run<R: FrameRead>(
    conn: Connection,
    mut reader: R,
    mut control: mpsc::Receiver<FlowSignal>,
) -> PumpExit {
    let shutdown = conn.shutdown_token().clone();
    let block_timeout = conn.config().block_timeout;
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => return PumpExit::Cancelled,
            Some(signal) = control.recv() => {
                if signal == FlowSignal::Block {
                    match flow::hold(&mut control, &shutdown, block_timeout).await {
                        Hold::Released => debug!("read pump released: id={}", conn.id()),
                        Hold::Shutdown => return PumpExit::Cancelled,
                        Hold::TimedOut => {
                            warn!("read pump block timed out: id={}", conn.id());
                            return PumpExit::Fault(CloseReason::BlockTimeout(Direction::Inbound));
                        }
                    }
                }
            }
            res = reader.read_frame() => match res {
                Ok(frame) => dispatch(&conn, frame),
                Err(e) if e.is_oversized() => {
                    crate::metrics::inc_oversized_frames();
                    warn!("oversized frame dropped: id={}, error={e}", conn.id());
                }
                Err(e) if e.is_clean_close() => return PumpExit::Fault(CloseReason::PeerClosed),
                Err(e) => {
                    crate::metrics::inc_errors();
                    debug!("read failed: id={}, error={e}", conn.id());
                    return PumpExit::Fault(CloseReason::ReadError(e.to_string()));
                }
            },
        }
    }
}

fn dispatch(conn: &Connection, frame: InboundFrame) {
    crate::metrics::inc_frames(Direction::Inbound);
    // Frames arriving during a graceful close only count as liveness.
    if conn.touch() != ConnState::Opened || frame.is_heartbeat() {
        return;
    }
    match conn.handler().on_receive(conn, frame.payload, frame.kind) {
        Ok(Some(reply)) => {
            if let Err(e) = conn.try_push(reply) {
                warn!("reply dropped: id={}, error={e}", conn.id());
            }
        }
        Ok(None) => {}
        Err(e) => warn!("receive handler failed: id={}, error={e}", conn.id()),
    }
}
