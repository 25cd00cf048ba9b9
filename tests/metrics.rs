#![cfg(feature = "metrics")]
//! Metrics emitted by the engine, captured with
//! `metrics_util::debugging::DebuggingRecorder`.

use std::time::Duration;

use gatewire::{
    ConnectionConfig,
    ConnectionHooks,
    ConnectionManager,
    connection::Direction,
    metrics::{
        BACKLOG_FULL_TOTAL,
        CONNECTIONS_ACTIVE,
        FRAMES_TOTAL,
        HEARTBEAT_TIMEOUTS_TOTAL,
        OVERSIZED_FRAMES_TOTAL,
        WRITE_DURATION_SECONDS,
        inc_frames,
    },
};
use gatewire_testing::{MetricsCapture, duplex_peer, duplex_peer_with};
use rstest::rstest;

fn echo_manager(config: ConnectionConfig) -> ConnectionManager {
    let hooks = ConnectionHooks::new().on_receive(|_conn, payload, _kind| Ok(Some(payload)));
    ConnectionManager::new(config, hooks.into_handler())
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_counter_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let capture = MetricsCapture::new();
    capture.run(async move { inc_frames(direction) });
    assert_eq!(capture.counter(FRAMES_TOTAL, &[("direction", label)]), 1);
}

#[test]
fn echo_round_trip_counts_both_directions() {
    let capture = MetricsCapture::new();
    capture.run(async {
        let manager = echo_manager(ConnectionConfig::default());
        let (transport, mut client) = duplex_peer();
        let conn = manager.accept(transport);
        client.send("ping").await.expect("send");
        assert_eq!(client.recv().await.as_deref(), Some(&b"ping"[..]));
        conn.close(false).await.expect("close");
    });

    assert_eq!(capture.counter(FRAMES_TOTAL, &[("direction", "inbound")]), 1);
    assert_eq!(capture.counter(FRAMES_TOTAL, &[("direction", "outbound")]), 1);
    assert_eq!(capture.gauge(CONNECTIONS_ACTIVE), Some(0.0));
}

#[test]
fn socket_writes_are_timed() {
    let capture = MetricsCapture::new();
    capture.run(async {
        let manager = echo_manager(ConnectionConfig::default());
        let (transport, mut client) = duplex_peer();
        let conn = manager.accept(transport);
        conn.send("one").await.expect("send");
        conn.send("two").await.expect("send");
        assert_eq!(client.recv().await.as_deref(), Some(&b"one"[..]));
        assert_eq!(client.recv().await.as_deref(), Some(&b"two"[..]));
        conn.close(true).await.expect("close");
    });

    let samples = capture.histogram(WRITE_DURATION_SECONDS);
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| *s >= 0.0));
}

#[test]
fn oversized_frames_are_counted() {
    let capture = MetricsCapture::new();
    capture.run(async {
        let manager = echo_manager(ConnectionConfig::default().with_max_frame_length(64));
        let (transport, mut client) = duplex_peer();
        let _conn = manager.accept(transport);
        client.send(vec![0u8; 200]).await.expect("send");
        client.send("small").await.expect("send");
        assert_eq!(client.recv().await.as_deref(), Some(&b"small"[..]));
        manager.close_all(true).await;
    });

    assert_eq!(capture.counter(OVERSIZED_FRAMES_TOTAL, &[]), 1);
}

#[test]
fn heartbeat_timeout_is_counted() {
    let capture = MetricsCapture::new();
    capture.run(async {
        tokio::time::pause();
        let config = ConnectionConfig::default().with_heartbeat(Duration::from_secs(5));
        let manager = echo_manager(config);
        let (transport, _client) = duplex_peer();
        let conn = manager.accept(transport);
        conn.wait_closed().await;
    });

    assert_eq!(capture.counter(HEARTBEAT_TIMEOUTS_TOTAL, &[]), 1);
}

#[test]
fn full_backlog_is_counted() {
    let capture = MetricsCapture::new();
    capture.run(async {
        tokio::time::pause();
        let manager = echo_manager(ConnectionConfig::default().with_queue_capacity(1));
        // The peer never reads, so the first frame stalls the writer.
        let (transport, _client) = duplex_peer_with(16);
        let conn = manager.accept(transport);
        conn.try_push(vec![1u8; 1024]).expect("first push");
        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.try_push(vec![2u8; 1024]).expect("second push");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        conn.close(true).await.expect("close");
    });

    assert!(capture.counter(BACKLOG_FULL_TOTAL, &[]) >= 1);
}
