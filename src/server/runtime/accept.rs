//! Accept loop feeding sockets into the connection manager.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{config::BackoffConfig, manager::ConnectionManager, transport::StreamTransport};

/// Source of incoming TCP connections consumed by the accept loop.
///
/// Dropping a pending `accept()` future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug, Clone)]
pub(in crate::server) struct AcceptLoopOptions {
    pub shutdown: CancellationToken,
    pub backoff: BackoffConfig,
}

/// Accept connections from `listener` and register each with `manager` until
/// `options.shutdown` is cancelled.
///
/// Accept failures are logged and retried after a delay that doubles on each
/// consecutive failure, capped at `backoff.max_delay`. A successful accept
/// resets the delay.
pub(in crate::server) async fn accept_loop<L>(
    listener: Arc<L>,
    manager: ConnectionManager,
    options: AcceptLoopOptions,
) where
    L: AcceptListener + 'static,
{
    let AcceptLoopOptions { shutdown, backoff } = options;
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(next) = accept_iteration(&*listener, &manager, &shutdown, &backoff, delay).await
    {
        delay = next;
    }
    debug!("accept loop stopped");
}

async fn accept_iteration<L: AcceptListener>(
    listener: &L,
    manager: &ConnectionManager,
    shutdown: &CancellationToken,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration> {
    let res = select! {
        biased;

        () = shutdown.cancelled() => return None,
        res = listener.accept() => res,
    };
    match res {
        Ok((stream, peer)) => {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("failed to set TCP_NODELAY: peer_addr={peer}, error={e}");
            }
            let conn = manager.accept(StreamTransport::tcp(stream));
            debug!("accepted connection: id={}, peer_addr={peer}", conn.id());
            Some(backoff.initial_delay)
        }
        Err(e) => {
            let local_addr = listener.local_addr().ok();
            warn!("accept error: error={e:?}, local_addr={local_addr:?}");
            select! {
                biased;

                () = shutdown.cancelled() => None,
                () = sleep(delay) => Some(backoff.next_delay(delay)),
            }
        }
    }
}
