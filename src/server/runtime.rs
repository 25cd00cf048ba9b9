//! Runtime control for [`GateServer`].

mod accept;
#[cfg(test)]
mod tests;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
use futures::Future;
use log::{info, warn};
use tokio::{select, signal, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, GateServer, ServerError};
use crate::{connection::CloseReason, manager::ConnectionManager};

impl GateServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// ```no_run
    /// use gatewire::{config::ServerConfig, hooks::ConnectionHooks, server::GateServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), gatewire::server::ServerError> {
    /// let server = GateServer::new(ServerConfig::default(), ConnectionHooks::new().into_handler())
    ///     .bind(([127, 0, 0, 1], 3553).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Unbound servers cannot run:
    ///
    /// ```compile_fail
    /// use gatewire::{config::ServerConfig, hooks::ConnectionHooks, server::GateServer};
    ///
    /// async fn try_run() {
    ///     GateServer::new(ServerConfig::default(), ConnectionHooks::new().into_handler())
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with back-off and do not surface here; the
    /// `Result` is kept for listener failures during startup.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves, then close every connection.
    ///
    /// Connections are closed gracefully and given `shutdown_timeout` to
    /// flush. Those still open afterwards are forced closed.
    ///
    /// ```
    /// use gatewire::{config::ServerConfig, hooks::ConnectionHooks, server::GateServer};
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), gatewire::server::ServerError> {
    /// let server = GateServer::new(ServerConfig::default(), ConnectionHooks::new().into_handler())
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`GateServer::run`].
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let GateServer {
            manager,
            config,
            ready_tx,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        for _ in 0..config.workers.max(1) {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                manager.clone(),
                AcceptLoopOptions {
                    shutdown: shutdown_token.clone(),
                    backoff: config.backoff,
                },
            ));
        }
        info!(
            "gateway listening: local_addr={:?}, workers={}",
            listener.local_addr().ok(),
            config.workers
        );

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        drain_connections(&manager, config.shutdown_timeout).await;
        info!("gateway stopped");
        Ok(())
    }
}

/// Close every connection gracefully, forcing whatever is left after
/// `grace`.
async fn drain_connections(manager: &ConnectionManager, grace: std::time::Duration) {
    if timeout(grace, manager.close_all(false)).await.is_ok() {
        return;
    }
    let stragglers = manager.snapshot();
    warn!(
        "graceful shutdown timed out, forcing connections: count={}",
        stragglers.len()
    );
    for conn in &stragglers {
        conn.finish(CloseReason::ServerShutdown);
    }
    futures::future::join_all(stragglers.iter().map(crate::connection::Connection::wait_closed))
        .await;
}
