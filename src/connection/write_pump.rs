//! Write pump: the only task that writes to the socket.
//!
//! The pump multiplexes the outbound queue, the heartbeat timer (when
//! enabled), the backlog timer and its flow-control channel. While a write is
//! in flight the shutdown token and both timers are still observed, so a
//! stalled peer cannot hide a full queue or a dead connection.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, trace, warn};
use tokio::{
    sync::mpsc,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

use super::{
    CloseReason,
    Connection,
    ConnectionError,
    Direction,
    flow::{self, FlowSignal, Hold},
    outbound::{Ack, Outbound, acknowledge},
    supervisor::PumpExit,
};
use crate::transport::FrameWrite;

/// Writes slower than this are reported at trace level.
const SLOW_WRITE: Duration = Duration::from_millis(50);

struct WritePump<W> {
    conn: Connection,
    writer: W,
    heartbeat: Option<Interval>,
    backlog: Interval,
    /// Whether application traffic was written since the last heartbeat tick.
    wrote: bool,
}

pub(super) async fn run<W: FrameWrite>(
    conn: Connection,
    writer: W,
    mut queue: mpsc::Receiver<Outbound>,
    mut control: mpsc::Receiver<FlowSignal>,
) -> PumpExit {
    let cfg = *conn.config();
    let now = Instant::now();
    let heartbeat = cfg.heartbeat_interval.map(|period| {
        let mut tick = interval_at(now + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick
    });
    let mut backlog = interval_at(
        now + cfg.backlog_check_interval,
        cfg.backlog_check_interval,
    );
    backlog.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pump = WritePump {
        conn,
        writer,
        heartbeat,
        backlog,
        wrote: false,
    };
    let shutdown = pump.conn.shutdown_token().clone();
    loop {
        if let Err(exit) = pump.step(&mut queue, &mut control, &shutdown).await {
            return exit;
        }
    }
}

/// Await the next tick of `interval`, or never if it is absent.
async fn next_tick(interval: Option<&mut Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

impl<W: FrameWrite> WritePump<W> {
    /// Handle one event. `Err` carries the reason the pump stops.
    async fn step(
        &mut self,
        queue: &mut mpsc::Receiver<Outbound>,
        control: &mut mpsc::Receiver<FlowSignal>,
        shutdown: &CancellationToken,
    ) -> Result<(), PumpExit> {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => Err(PumpExit::Cancelled),
            Some(signal) = control.recv() => match signal {
                FlowSignal::Block => self.hold(control).await,
                FlowSignal::Release => Ok(()),
            },
            _ = next_tick(self.heartbeat.as_mut()) => self.on_heartbeat().await,
            _ = self.backlog.tick() => {
                check_backlog(&self.conn);
                Ok(())
            }
            item = queue.recv() => match item {
                Some(Outbound::Data { payload, ack }) => {
                    self.wrote = true;
                    self.deliver(payload, ack).await
                }
                Some(Outbound::Close) => {
                    if let Err(e) = self.writer.close().await {
                        debug!("shutdown after flush failed: id={}, error={e}", self.conn.id());
                    }
                    Err(PumpExit::Drained)
                }
                None => Err(PumpExit::Cancelled),
            },
        }
    }

    async fn hold(&mut self, control: &mut mpsc::Receiver<FlowSignal>) -> Result<(), PumpExit> {
        let timeout = self.conn.config().block_timeout;
        match flow::hold(control, self.conn.shutdown_token(), timeout).await {
            Hold::Released => {
                debug!("write pump released: id={}", self.conn.id());
                Ok(())
            }
            Hold::Shutdown => Err(PumpExit::Cancelled),
            Hold::TimedOut => {
                warn!("write pump block timed out: id={}", self.conn.id());
                Err(PumpExit::Fault(CloseReason::BlockTimeout(
                    Direction::Outbound,
                )))
            }
        }
    }

    async fn on_heartbeat(&mut self) -> Result<(), PumpExit> {
        check_liveness(&self.conn)?;
        let idle = !std::mem::take(&mut self.wrote);
        if idle && self.conn.config().keepalive {
            trace!("keepalive frame: id={}", self.conn.id());
            self.deliver(Bytes::new(), None).await?;
        }
        Ok(())
    }

    /// Write one frame while still honouring shutdown and both timers.
    async fn deliver(&mut self, payload: Bytes, ack: Option<Ack>) -> Result<(), PumpExit> {
        let shutdown = self.conn.shutdown_token().clone();
        let started = Instant::now();
        let write = self.writer.write_frame(payload);
        tokio::pin!(write);
        let result = loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return Err(PumpExit::Cancelled),
                _ = next_tick(self.heartbeat.as_mut()) => check_liveness(&self.conn)?,
                _ = self.backlog.tick() => check_backlog(&self.conn),
                res = &mut write => break res,
            }
        };

        let elapsed = started.elapsed();
        crate::metrics::record_write_duration(elapsed);
        if elapsed >= SLOW_WRITE {
            trace!(
                "slow write: id={}, elapsed_ms={}",
                self.conn.id(),
                elapsed.as_millis()
            );
        }
        match result {
            Ok(()) => {
                crate::metrics::inc_frames(Direction::Outbound);
                acknowledge(ack, Ok(()));
            }
            Err(e) => {
                if !e.is_connection_aborted() {
                    crate::metrics::inc_errors();
                    error!("write failed: id={}, error={e}", self.conn.id());
                }
                acknowledge(ack, Err(ConnectionError::Write(e.into_io())));
            }
        }
        Ok(())
    }
}

/// Fail if the peer has been silent for two heartbeat intervals.
fn check_liveness(conn: &Connection) -> Result<(), PumpExit> {
    let Some(period) = conn.config().heartbeat_interval else {
        return Ok(());
    };
    if conn.is_silent_for(period * 2) {
        crate::metrics::inc_heartbeat_timeouts();
        warn!(
            "heartbeat timeout: id={}, uid={}, interval_ms={}",
            conn.id(),
            conn.uid(),
            period.as_millis()
        );
        return Err(PumpExit::Fault(CloseReason::HeartbeatTimeout));
    }
    Ok(())
}

fn check_backlog(conn: &Connection) {
    let capacity = conn.config().queue_capacity;
    if conn.backlog() >= capacity {
        crate::metrics::inc_backlog_full();
        warn!(
            "outbound queue full: id={}, uid={}, capacity={capacity}",
            conn.id(),
            conn.uid()
        );
    }
}
