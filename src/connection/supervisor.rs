//! Supervisor task owning a connection's pumps and its terminal cleanup.
//!
//! The supervisor spawns both pumps, waits for each to exit, and turns every
//! exit (orderly, faulted or panicked) into exactly one transition to
//! `Closed`. Once both pumps are gone it runs the disconnect hook and wakes
//! anyone waiting in [`Connection::wait_closed`].

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::{error, info};
use tokio::task::{JoinError, JoinHandle};

use super::{
    CloseReason,
    Connection,
    Direction,
    PumpChannels,
    counter::ActiveConnection,
    read_pump,
    write_pump,
};
use crate::{panic::describe_join_error, transport::Transport};

/// How a pump stopped.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PumpExit {
    /// Shutdown was requested by someone else.
    Cancelled,
    /// The write pump flushed everything up to a graceful close marker.
    Drained,
    /// The pump hit a condition that closes the connection.
    Fault(CloseReason),
}

/// Start the engine for `conn` on `transport`.
pub(crate) fn spawn<T: Transport>(
    conn: Connection,
    transport: T,
    channels: PumpChannels,
) -> JoinHandle<()> {
    tokio::spawn(supervise(conn, transport, channels))
}

async fn supervise<T: Transport>(conn: Connection, transport: T, channels: PumpChannels) {
    let _active = ActiveConnection::new();
    // Wakes `wait_closed` even if a hook below panics.
    let _closed = conn.inner.closed.clone().drop_guard();

    run_hook(&conn, "on_connect", |c| c.handler().on_connect(c));
    info!(
        "connection opened: id={}, peer_addr={:?}",
        conn.id(),
        conn.inner.peer_addr
    );

    let PumpChannels {
        queue,
        read_ctl,
        write_ctl,
    } = channels;
    let (reader, writer) = transport.into_split(conn.config().max_frame_length);
    let mut read = tokio::spawn(read_pump::run(conn.clone(), reader, read_ctl));
    let mut write = tokio::spawn(write_pump::run(conn.clone(), writer, queue, write_ctl));

    let mut read_done = false;
    let mut write_done = false;
    while !(read_done && write_done) {
        tokio::select! {
            res = &mut read, if !read_done => {
                read_done = true;
                settle(&conn, Direction::Inbound, res);
            }
            res = &mut write, if !write_done => {
                write_done = true;
                settle(&conn, Direction::Outbound, res);
            }
        }
    }

    // Both halves of the transport have been dropped; the socket is closed.
    conn.finish(CloseReason::Forced);
    info!(
        "connection closed: id={}, uid={}, peer_addr={:?}, reason={}",
        conn.id(),
        conn.uid(),
        conn.inner.peer_addr,
        conn.close_reason()
            .map_or_else(|| "unknown".to_string(), |r| r.to_string())
    );
    run_hook(&conn, "on_disconnect", |c| c.handler().on_disconnect(c));
}

/// Turn a pump's exit into a close transition.
fn settle(conn: &Connection, direction: Direction, res: Result<PumpExit, JoinError>) {
    match res {
        Ok(PumpExit::Cancelled) => {}
        Ok(PumpExit::Drained) => {
            conn.finish(CloseReason::Graceful);
        }
        Ok(PumpExit::Fault(reason)) => {
            conn.finish(reason);
        }
        Err(e) => {
            crate::metrics::inc_pump_panics();
            let panic_msg = describe_join_error(e);
            tracing::error!(id = %conn.id(), %direction, panic = %panic_msg, "pump panicked");
            conn.finish(CloseReason::PumpPanic(direction));
        }
    }
}

fn run_hook(conn: &Connection, name: &str, hook: impl FnOnce(&Connection)) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(conn))) {
        let panic_msg = crate::panic::format_panic(payload.as_ref());
        error!("{name} hook panicked: id={}, panic={panic_msg}", conn.id());
    }
}
