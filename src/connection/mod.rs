//! The per-connection I/O engine.
//!
//! A [`Connection`] owns one transport, split between a read pump and a write
//! pump that run as separate tasks under a supervisor:
//!
//! - the **read pump** decodes frames, refreshes liveness and hands payloads to
//!   [`ConnectionHandler::on_receive`](crate::hooks::ConnectionHandler::on_receive);
//! - the **write pump** is the only writer to the socket. It drains the bounded
//!   outbound FIFO and drives the heartbeat and backlog timers;
//! - the **supervisor** joins both pumps, recovers their panics and runs the
//!   terminal cleanup exactly once.
//!
//! State lives behind a single mutex. `Opened -> Hanged -> Closed` is the
//! graceful path; a forced close goes straight to `Closed` and discards
//! whatever is still queued.
//!
//! All writes, including [`Connection::send`], go through the outbound queue,
//! so frames reach the socket in enqueue order regardless of which method
//! produced them.

mod counter;
mod error;
mod flow;
mod outbound;
mod read_pump;
mod state;
pub(crate) mod supervisor;
mod write_pump;

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use bytes::Bytes;
pub use error::{CloseReason, ConnectionError, Direction};
use flow::FlowSignal;
use log::warn;
use outbound::Outbound;
use state::Shared;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConnectionConfig,
    hooks::ConnectionHandler,
    manager::Registry,
    session::{ConnState, ConnectionId},
};

/// Handle to a live or closed connection.
///
/// Cloning is cheap; every clone refers to the same engine.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: ConnectionId,
    shared: Mutex<Shared>,
    outbound: mpsc::Sender<Outbound>,
    read_ctl: mpsc::Sender<FlowSignal>,
    write_ctl: mpsc::Sender<FlowSignal>,
    /// Stops both pumps.
    shutdown: CancellationToken,
    /// Cancelled once teardown and the disconnect hook have completed.
    closed: CancellationToken,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    config: ConnectionConfig,
    registry: Weak<Registry>,
    handler: Arc<dyn ConnectionHandler>,
}

/// Receiving ends consumed by the pumps.
pub(crate) struct PumpChannels {
    queue: mpsc::Receiver<Outbound>,
    read_ctl: mpsc::Receiver<FlowSignal>,
    write_ctl: mpsc::Receiver<FlowSignal>,
}

/// Construction parameters for [`Connection::new`].
pub(crate) struct ConnectionParts {
    pub(crate) id: ConnectionId,
    pub(crate) config: ConnectionConfig,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) peer_addr: Option<SocketAddr>,
    pub(crate) handler: Arc<dyn ConnectionHandler>,
    pub(crate) registry: Weak<Registry>,
}

impl Connection {
    pub(crate) fn new(parts: ConnectionParts) -> (Self, PumpChannels) {
        let config = parts.config.normalized();
        let (outbound, queue) = mpsc::channel(config.queue_capacity);
        let (read_ctl, read_rx) = mpsc::channel(flow::CONTROL_CAPACITY);
        let (write_ctl, write_rx) = mpsc::channel(flow::CONTROL_CAPACITY);
        let inner = ConnectionInner {
            id: parts.id,
            shared: Mutex::new(Shared::new()),
            outbound,
            read_ctl,
            write_ctl,
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
            local_addr: parts.local_addr,
            peer_addr: parts.peer_addr,
            config,
            registry: parts.registry,
            handler: parts.handler,
        };
        let channels = PumpChannels {
            queue,
            read_ctl: read_rx,
            write_ctl: write_rx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            channels,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifier assigned by the manager.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.inner.id }

    /// Bound user id, or `0` when unbound.
    #[must_use]
    pub fn uid(&self) -> i64 { self.lock().uid }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnState { self.lock().state }

    /// Returns `true` once the connection has reached `Closed`.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.state() == ConnState::Closed }

    /// Why the connection closed, if it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> { self.lock().close_reason.clone() }

    /// Time the last frame (including heartbeat frames) was read.
    #[must_use]
    pub fn last_heartbeat(&self) -> Instant { self.lock().last_heartbeat }

    /// Effective configuration of this connection.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.inner.config }

    /// Number of items waiting in the outbound queue.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.inner.outbound.max_capacity() - self.inner.outbound.capacity()
    }

    /// Bind the connection to `uid`. Last write wins.
    ///
    /// The manager's uid index is only updated while the connection is not
    /// `Closed`; binding `0` is the same as [`Connection::unbind`].
    pub fn bind(&self, uid: i64) {
        let mut shared = self.lock();
        let previous = std::mem::replace(&mut shared.uid, uid);
        if shared.state == ConnState::Closed {
            return;
        }
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.rebind(self, previous, uid);
        }
    }

    /// Clear the bound uid.
    pub fn unbind(&self) { self.bind(0); }

    /// Local socket address.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Hanged`] or [`ConnectionError::Closed`] outside
    /// `Opened`; [`ConnectionError::AddressUnavailable`] if the transport has
    /// no address.
    pub fn local_addr(&self) -> Result<SocketAddr, ConnectionError> {
        self.lock().check_open()?;
        self.inner
            .local_addr
            .ok_or(ConnectionError::AddressUnavailable)
    }

    /// Remote peer address.
    ///
    /// # Errors
    ///
    /// As for [`Connection::local_addr`].
    pub fn remote_addr(&self) -> Result<SocketAddr, ConnectionError> {
        self.lock().check_open()?;
        self.inner
            .peer_addr
            .ok_or(ConnectionError::AddressUnavailable)
    }

    /// Local IP address.
    ///
    /// # Errors
    ///
    /// As for [`Connection::local_addr`].
    pub fn local_ip(&self) -> Result<IpAddr, ConnectionError> {
        self.local_addr().map(|addr| addr.ip())
    }

    /// Remote peer IP address.
    ///
    /// # Errors
    ///
    /// As for [`Connection::local_addr`].
    pub fn remote_ip(&self) -> Result<IpAddr, ConnectionError> {
        self.remote_addr().map(|addr| addr.ip())
    }

    /// Enqueue `payload` without waiting.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Hanged`] or [`ConnectionError::Closed`] outside
    /// `Opened`; [`ConnectionError::QueueFull`] if the queue is at capacity.
    pub fn try_push(&self, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        self.lock().check_open()?;
        self.inner
            .outbound
            .try_send(Outbound::data(payload.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    crate::metrics::inc_errors();
                    ConnectionError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
            })
    }

    /// Enqueue `payload`, waiting at most `push_timeout` for queue space.
    ///
    /// Completion means the frame is queued, not that it was delivered.
    ///
    /// # Errors
    ///
    /// As for [`Connection::try_push`]; `QueueFull` is returned once the
    /// timeout elapses.
    pub async fn push(&self, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        self.lock().check_open()?;
        self.enqueue(Outbound::data(payload.into())).await
    }

    /// Write `payload` and wait until the write pump has written it.
    ///
    /// The frame travels through the outbound queue like any pushed frame, so
    /// it keeps its place in the FIFO relative to earlier pushes. Waiting for
    /// queue space and waiting for the write are each bounded by
    /// `push_timeout`.
    ///
    /// # Errors
    ///
    /// As for [`Connection::push`], plus [`ConnectionError::Write`] if the
    /// socket write failed, [`ConnectionError::WriteTimeout`] if the write was
    /// not confirmed in time, and [`ConnectionError::Closed`] if the frame was
    /// discarded by a forced close. After `WriteTimeout` the frame stays
    /// queued and may still reach the peer.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        self.lock().check_open()?;
        let (tx, rx) = oneshot::channel();
        self.enqueue(Outbound::Data {
            payload: payload.into(),
            ack: Some(tx),
        })
        .await?;
        match timeout(self.inner.config.push_timeout, rx).await {
            Ok(ack) => ack.unwrap_or(Err(ConnectionError::Closed)),
            Err(_) => {
                crate::metrics::inc_errors();
                warn!("send not acknowledged in time: id={}", self.id());
                Err(ConnectionError::WriteTimeout)
            }
        }
    }

    async fn enqueue(&self, item: Outbound) -> Result<(), ConnectionError> {
        self.inner
            .outbound
            .send_timeout(item, self.inner.config.push_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => {
                    crate::metrics::inc_errors();
                    ConnectionError::QueueFull
                }
                mpsc::error::SendTimeoutError::Closed(_) => ConnectionError::Closed,
            })
    }

    /// Close the connection and wait until teardown has finished.
    ///
    /// A graceful close (`force == false`) moves to `Hanged` and lets the
    /// write pump flush everything queued before it. A forced close discards
    /// the queue.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Closed`] if already closed.
    /// [`ConnectionError::Hanged`] for a graceful close while one is already
    /// in progress.
    pub async fn close(&self, force: bool) -> Result<(), ConnectionError> {
        if force {
            self.force_close()?;
        } else {
            self.lock().begin_hang()?;
            if let Err(e) = self.enqueue(Outbound::Close).await {
                warn!(
                    "graceful close could not be queued, forcing: id={}, error={e}",
                    self.id()
                );
                self.finish(CloseReason::Forced);
            }
        }
        self.wait_closed().await;
        Ok(())
    }

    /// Force the connection closed without waiting for teardown.
    ///
    /// Queued frames are discarded. Teardown and the disconnect hook run on
    /// the connection's supervisor task; await [`Connection::wait_closed`] to
    /// observe their completion.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Closed`] if already closed.
    pub fn force_close(&self) -> Result<(), ConnectionError> {
        if self.finish(CloseReason::Forced) {
            Ok(())
        } else {
            Err(ConnectionError::Closed)
        }
    }

    /// Wait until the connection is closed, its pumps have exited, and the
    /// disconnect hook has returned.
    pub async fn wait_closed(&self) { self.inner.closed.cancelled().await; }

    /// Pause both pumps until [`Connection::release`] or the block timeout.
    ///
    /// Overlapping block/release pairs from different callers are not
    /// supported.
    pub fn block(&self) { self.signal(FlowSignal::Block); }

    /// Resume pumps paused by [`Connection::block`].
    pub fn release(&self) { self.signal(FlowSignal::Release); }

    fn signal(&self, signal: FlowSignal) {
        // A full or closed control channel only happens when the pump is
        // already handling a signal or gone.
        let _ = self.inner.read_ctl.try_send(signal);
        let _ = self.inner.write_ctl.try_send(signal);
    }

    /// Transition to `Closed` and recycle from the manager in one critical
    /// section, then stop the pumps. Returns `false` if already closed.
    pub(crate) fn finish(&self, reason: CloseReason) -> bool {
        {
            let mut shared = self.lock();
            let uid = shared.uid;
            if !shared.finish(reason) {
                return false;
            }
            if let Some(registry) = self.inner.registry.upgrade() {
                registry.recycle(self.id(), uid);
            }
        }
        self.inner.shutdown.cancel();
        true
    }

    /// Refresh liveness after a frame was read, returning the current state.
    fn touch(&self) -> ConnState {
        let mut shared = self.lock();
        shared.last_heartbeat = Instant::now();
        shared.state
    }

    /// Returns `true` if nothing has been read for `window`.
    fn is_silent_for(&self, window: std::time::Duration) -> bool {
        Instant::now().duration_since(self.lock().last_heartbeat) >= window
    }

    fn shutdown_token(&self) -> &CancellationToken { &self.inner.shutdown }

    fn handler(&self) -> &Arc<dyn ConnectionHandler> { &self.inner.handler }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .finish_non_exhaustive()
    }
}
