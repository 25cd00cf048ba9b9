//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{sync::Arc, time::Duration};

use gatewire::{ConnectionConfig, ConnectionHandler, ConnectionManager, GateProvider};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Bound for waiting on engine-side effects in real-time tests.
pub const SETTLE: Duration = Duration::from_secs(1);

pub fn manager(handler: Arc<dyn ConnectionHandler>) -> ConnectionManager {
    ConnectionManager::new(ConnectionConfig::default(), handler)
}

pub fn provider(handler: Arc<dyn ConnectionHandler>) -> GateProvider {
    GateProvider::new(manager(handler))
}

/// Poll `cond` until it holds or [`SETTLE`] elapses.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(SETTLE, async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .is_ok()
}
