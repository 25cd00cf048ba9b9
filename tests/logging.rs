//! Warnings the engine logs for slow consumers and dead peers.

use std::time::Duration;

use gatewire::{ConnectionConfig, ConnectionManager, connection::CloseReason};
use gatewire_testing::{LoggerHandle, RecordingHandler, duplex_peer, duplex_peer_with, logger};
use log::Level;
use rstest::rstest;

fn manager(config: ConnectionConfig) -> ConnectionManager {
    ConnectionManager::new(config, RecordingHandler::new())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_consumer_triggers_backlog_warning(mut logger: LoggerHandle) {
    let manager = manager(ConnectionConfig::default().with_queue_capacity(1));
    // The peer never reads, so the first frame stalls the writer.
    let (transport, _client) = duplex_peer_with(16);
    let conn = manager.accept(transport);
    conn.try_push(vec![1u8; 1024]).expect("first push");
    tokio::time::sleep(Duration::from_millis(10)).await;
    conn.try_push(vec![2u8; 1024]).expect("second push");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let warnings = logger.drain_matching(Level::Warn, "outbound queue full");
    assert!(!warnings.is_empty(), "expected a backlog warning");
    assert!(warnings[0].contains(&format!("id={}", conn.id())));
    assert_eq!(conn.state(), gatewire::ConnState::Opened);
    conn.close(true).await.expect("close");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_peer_logs_heartbeat_timeout(mut logger: LoggerHandle) {
    let manager = manager(ConnectionConfig::default().with_heartbeat(Duration::from_secs(5)));
    let (transport, mut client) = duplex_peer();
    let conn = manager.accept(transport);

    conn.wait_closed().await;

    assert_eq!(conn.close_reason(), Some(CloseReason::HeartbeatTimeout));
    // Only keepalive frames were written before the socket closed.
    assert!(client.recv_data().await.is_none());
    assert_eq!(
        logger
            .drain_matching(Level::Warn, "heartbeat timeout")
            .len(),
        1
    );
}

#[rstest]
#[tokio::test]
async fn close_is_logged_with_reason(mut logger: LoggerHandle) {
    let manager = manager(ConnectionConfig::default());
    let (transport, _client) = duplex_peer();
    let conn = manager.accept(transport);
    conn.bind(31);

    conn.close(false).await.expect("close");

    let lines = logger.drain_matching(Level::Info, "connection closed");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("uid=31"));
    assert!(lines[0].contains("reason=graceful"));
}
