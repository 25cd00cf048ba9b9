//! Tests for server runtime behaviour.

use std::{
    io,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rstest::rstest;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::yield_now,
    time::{Duration, Instant, advance, timeout},
};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

use super::{AcceptLoopOptions, MockAcceptListener, accept_loop};
use crate::{
    codec::LengthPrefixedCodec,
    config::{BackoffConfig, ConnectionConfig, ServerConfig},
    hooks::ConnectionHooks,
    manager::ConnectionManager,
    server::test_util::{bind_echo_server, free_listener},
};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn idle_manager() -> ConnectionManager {
    ConnectionManager::new(ConnectionConfig::default(), ConnectionHooks::new().into_handler())
}

#[rstest]
#[tokio::test]
async fn run_with_immediate_shutdown(free_listener: std::net::TcpListener) {
    let server = bind_echo_server(ServerConfig::default(), free_listener);
    let shutdown_future = async { tokio::time::sleep(Duration::from_millis(10)).await };
    let result = timeout(
        Duration::from_millis(1000),
        server.run_with_shutdown(shutdown_future),
    )
    .await;
    assert!(result.expect("server did not finish in time").is_ok());
}

#[rstest]
#[tokio::test]
async fn multiple_workers_start_and_stop(free_listener: std::net::TcpListener) {
    let server = bind_echo_server(ServerConfig::default(), free_listener).workers(3);
    assert_eq!(server.worker_count(), 3);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.ready_signal(ready_tx).run_with_shutdown(async {
        let _ = rx.await;
    }));
    ready_rx.await.expect("server never became ready");
    let _ = tx.send(());
    timeout(Duration::from_millis(1000), handle)
        .await
        .expect("server did not finish in time")
        .expect("server join error")
        .expect("server run failed");
}

#[rstest]
#[tokio::test]
async fn echoes_frames_and_closes_clients_on_shutdown(
    free_listener: std::net::TcpListener,
) -> TestResult {
    let addr = free_listener.local_addr()?;
    let server = bind_echo_server(ServerConfig::default(), free_listener);
    let manager = server.manager().clone();
    let (ready_tx, ready_rx) = oneshot::channel();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.ready_signal(ready_tx).run_with_shutdown(async {
        let _ = rx.await;
    }));
    ready_rx.await?;

    let stream = TcpStream::connect(addr).await?;
    let mut client = Framed::new(stream, LengthPrefixedCodec::default());
    client.send(Bytes::from_static(b"ping")).await?;
    let echoed = timeout(Duration::from_secs(1), client.next())
        .await?
        .ok_or("connection closed before echo")??;
    assert_eq!(&echoed[..], b"ping");
    assert_eq!(manager.len(), 1);

    let _ = tx.send(());
    timeout(Duration::from_secs(2), handle).await???;
    let tail = timeout(Duration::from_secs(1), client.next()).await?;
    assert!(tail.is_none(), "client should observe EOF after shutdown");
    assert!(manager.is_empty());
    Ok(())
}

#[tokio::test]
async fn accept_loop_stops_on_shutdown_signal() {
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let listener = Arc::new(
        TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener"),
    );

    tracker.spawn(accept_loop(
        listener,
        idle_manager(),
        AcceptLoopOptions {
            shutdown: token.clone(),
            backoff: BackoffConfig::default(),
        },
    ));

    token.cancel();
    tracker.close();

    let result = timeout(Duration::from_millis(100), tracker.wait()).await;
    assert!(result.is_ok());
}

/// Creates a mock listener whose accepts always fail, logging each call.
fn failing_listener(calls: &Arc<Mutex<Vec<Instant>>>, num_calls: usize) -> MockAcceptListener {
    let mut listener = MockAcceptListener::new();
    let call_log = Arc::clone(calls);
    listener
        .expect_accept()
        .returning(move || {
            let call_log = Arc::clone(&call_log);
            Box::pin(async move {
                call_log.lock().expect("lock").push(Instant::now());
                Err(io::Error::other("mock error"))
            })
        })
        .times(num_calls);
    listener
        .expect_local_addr()
        .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
        .times(num_calls);
    listener
}

fn intervals(calls: &[Instant]) -> Vec<Duration> {
    calls
        .windows(2)
        .filter_map(|pair| match pair {
            [a, b] => b.checked_duration_since(*a),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn accept_errors_back_off_exponentially() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(failing_listener(&calls, 4));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let backoff = BackoffConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    };

    tracker.spawn(accept_loop(
        listener,
        idle_manager(),
        AcceptLoopOptions {
            shutdown: token.clone(),
            backoff,
        },
    ));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);

    for ms in [5, 10, 20] {
        advance(Duration::from_millis(ms)).await;
        yield_now().await;
    }

    token.cancel();
    tracker.close();
    tracker.wait().await;

    let calls = calls.lock().expect("lock");
    assert_eq!(calls.len(), 4);
    assert_eq!(
        intervals(&calls),
        [
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]
    );
}
