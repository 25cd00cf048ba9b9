//! In-memory peer for a gateway connection.

use std::{io, net::SocketAddr, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use gatewire::{StreamTransport, codec::LengthPrefixedCodec};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

/// Buffer size of each direction of the duplex pipe.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// How long [`TestClient::recv`] waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Address reported as the remote peer of duplex transports.
#[must_use]
pub fn peer_addr() -> SocketAddr { SocketAddr::from(([10, 0, 0, 7], 51000)) }

fn local_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 3553)) }

/// Create a transport for the gateway side and a framed client for the peer
/// side of one duplex pipe.
#[must_use]
pub fn duplex_peer() -> (StreamTransport<DuplexStream>, TestClient) {
    duplex_peer_with(PIPE_CAPACITY)
}

/// As [`duplex_peer`], with `capacity` bytes of buffering per direction.
#[must_use]
pub fn duplex_peer_with(capacity: usize) -> (StreamTransport<DuplexStream>, TestClient) {
    let (server, client) = tokio::io::duplex(capacity);
    let transport =
        StreamTransport::new(server).with_addrs(Some(local_addr()), Some(peer_addr()));
    let framed = Framed::new(client, LengthPrefixedCodec::new(usize::MAX));
    (transport, TestClient { framed })
}

/// The remote end of a connection under test.
#[derive(Debug)]
pub struct TestClient {
    framed: Framed<DuplexStream, LengthPrefixedCodec>,
}

impl TestClient {
    /// Send one frame to the gateway.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the pipe is closed.
    pub async fn send(&mut self, payload: impl Into<Bytes>) -> io::Result<()> {
        self.framed
            .send(payload.into())
            .await
            .map_err(gatewire::codec::error::CodecError::into_io)
    }

    /// Receive the next frame, waiting up to [`RECV_TIMEOUT`].
    ///
    /// Returns `None` on EOF, on a decode error, or if nothing arrives in
    /// time.
    pub async fn recv(&mut self) -> Option<Bytes> {
        match tokio::time::timeout(RECV_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(frame),
            _ => None,
        }
    }

    /// Receive the next frame, skipping zero-length keepalive frames.
    pub async fn recv_data(&mut self) -> Option<Bytes> {
        loop {
            let frame = self.recv().await?;
            if !frame.is_empty() {
                return Some(frame);
            }
        }
    }

    /// Returns `true` if the gateway closed the pipe with no frame pending.
    pub async fn is_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(RECV_TIMEOUT, self.framed.next()).await,
            Ok(None)
        )
    }

    /// Receive frames until the gateway closes the pipe.
    pub async fn drain(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = self.recv().await {
            frames.push(frame);
        }
        frames
    }
}
