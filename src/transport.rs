//! Transport capability consumed by the connection engine.
//!
//! A [`Transport`] is split once into a [`FrameRead`] half owned by the read
//! pump and a [`FrameWrite`] half owned by the write pump. The engine never
//! touches raw bytes; every transport frames its own traffic.
//!
//! [`StreamTransport`] implements the capability for any byte stream
//! (`TcpStream`, `tokio::io::DuplexStream`, ...) using
//! [`LengthPrefixedCodec`].

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf, WriteHalf},
    net::TcpStream,
};
use tokio_util::codec::{Decoder, FramedWrite};

use crate::{
    codec::{CodecError, EofError, LengthPrefixedCodec},
    session::MessageKind,
};

/// One decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundFrame {
    /// Frame payload; empty for heartbeat frames.
    pub payload: Bytes,
    /// Type tag forwarded to the receive hook.
    pub kind: MessageKind,
}

impl InboundFrame {
    /// Construct a binary frame.
    #[must_use]
    pub fn binary(payload: Bytes) -> Self {
        Self {
            payload,
            kind: MessageKind::Binary,
        }
    }

    /// Returns `true` for a zero-length heartbeat frame.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool { self.payload.is_empty() }
}

/// Reading half of a transport.
#[async_trait]
pub trait FrameRead: Send + 'static {
    /// Read exactly one frame.
    ///
    /// Implementations must be cancel safe: dropping the future before it
    /// completes must not lose buffered bytes.
    ///
    /// # Errors
    ///
    /// [`CodecError::Framing`] for an oversized frame (the frame has been
    /// skipped and reading may continue), [`CodecError::Eof`] when the peer
    /// closed the stream, [`CodecError::Io`] on socket failure.
    async fn read_frame(&mut self) -> Result<InboundFrame, CodecError>;
}

/// Writing half of a transport.
#[async_trait]
pub trait FrameWrite: Send + 'static {
    /// Frame and write `payload`, flushing it to the peer.
    ///
    /// # Errors
    ///
    /// Returns the codec or socket error. The caller decides whether to go on.
    async fn write_frame(&mut self, payload: Bytes) -> Result<(), CodecError>;

    /// Flush and shut down the write direction.
    ///
    /// # Errors
    ///
    /// Returns any socket error raised while shutting down.
    async fn close(&mut self) -> Result<(), CodecError>;
}

/// A full-duplex connection that can be split between the two pumps.
pub trait Transport: Send + 'static {
    /// Reading half handed to the read pump.
    type Reader: FrameRead;
    /// Writing half handed to the write pump.
    type Writer: FrameWrite;

    /// Address of the remote peer, when known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Local address of the socket, when known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Split into independently owned halves.
    fn into_split(self, max_frame_length: usize) -> (Self::Reader, Self::Writer);
}

/// [`Transport`] over any async byte stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a stream with no known addresses.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            local: None,
            peer: None,
        }
    }

    /// Attach the socket addresses reported by address queries.
    #[must_use]
    pub fn with_addrs(mut self, local: Option<SocketAddr>, peer: Option<SocketAddr>) -> Self {
        self.local = local;
        self.peer = peer;
        self
    }
}

impl StreamTransport<TcpStream> {
    /// Wrap an accepted TCP stream, capturing both addresses.
    #[must_use]
    pub fn tcp(stream: TcpStream) -> Self {
        let local = stream.local_addr().ok();
        let peer = stream.peer_addr().ok();
        Self::new(stream).with_addrs(local, peer)
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    type Reader = StreamReader<S>;
    type Writer = StreamWriter<S>;

    fn peer_addr(&self) -> Option<SocketAddr> { self.peer }

    fn local_addr(&self) -> Option<SocketAddr> { self.local }

    fn into_split(self, max_frame_length: usize) -> (Self::Reader, Self::Writer) {
        let (read, write) = tokio::io::split(self.stream);
        let reader = StreamReader {
            io: read,
            codec: LengthPrefixedCodec::new(max_frame_length),
            buf: BytesMut::new(),
        };
        let writer = StreamWriter {
            framed: FramedWrite::new(write, LengthPrefixedCodec::new(max_frame_length)),
        };
        (reader, writer)
    }
}

/// Reading half of a [`StreamTransport`].
///
/// Decoding is driven by hand rather than through `FramedRead`, which stops
/// yielding after the first decoder error; an oversized frame must not end
/// the stream.
pub struct StreamReader<S> {
    io: ReadHalf<S>,
    codec: LengthPrefixedCodec,
    buf: BytesMut,
}

#[async_trait]
impl<S> FrameRead for StreamReader<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<InboundFrame, CodecError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(InboundFrame::binary(frame));
            }
            if self.io.read_buf(&mut self.buf).await? == 0 {
                return match self.codec.decode_eof(&mut self.buf)? {
                    Some(frame) => Ok(InboundFrame::binary(frame)),
                    None => Err(CodecError::Eof(EofError::CleanClose)),
                };
            }
        }
    }
}

/// Writing half of a [`StreamTransport`].
pub struct StreamWriter<S> {
    framed: FramedWrite<WriteHalf<S>, LengthPrefixedCodec>,
}

#[async_trait]
impl<S> FrameWrite for StreamWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write_frame(&mut self, payload: Bytes) -> Result<(), CodecError> {
        let result = self.framed.send(payload).await;
        if result.is_err() {
            // A failed frame is dropped, not flushed ahead of the next one.
            self.framed.write_buffer_mut().clear();
        }
        result
    }

    async fn close(&mut self) -> Result<(), CodecError> { self.framed.close().await }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf, duplex};

    use super::*;

    /// Stream whose first write fails with `BrokenPipe`.
    struct FailFirstWrite {
        inner: DuplexStream,
        failed: bool,
    }

    impl AsyncRead for FailFirstWrite {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FailFirstWrite {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            if !this.failed {
                this.failed = true;
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            Pin::new(&mut this.inner).poll_write(cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_flush(cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn reader_yields_frames_then_clean_close() {
        let (mut client, server) = duplex(256);
        let (mut reader, _writer) = StreamTransport::new(server).into_split(128);

        client
            .write_all(b"\0\0\0\x02hi\0\0\0\0")
            .await
            .expect("write");
        drop(client);

        let first = reader.read_frame().await.expect("frame");
        assert_eq!(&first.payload[..], b"hi");
        assert!(reader.read_frame().await.expect("heartbeat").is_heartbeat());
        let err = reader.read_frame().await.expect_err("eof");
        assert!(err.is_clean_close());
    }

    #[tokio::test]
    async fn reader_survives_oversized_frame() {
        let (mut client, server) = duplex(1024);
        let (mut reader, _writer) = StreamTransport::new(server).into_split(64);

        let mut wire = vec![0, 0, 0, 100];
        wire.extend_from_slice(&[1_u8; 100]);
        wire.extend_from_slice(b"\0\0\0\x02ok");
        client.write_all(&wire).await.expect("write");

        let err = reader.read_frame().await.expect_err("oversized");
        assert!(err.is_oversized());
        let frame = reader.read_frame().await.expect("frame");
        assert_eq!(&frame.payload[..], b"ok");
    }

    #[tokio::test]
    async fn writer_frames_payloads() {
        let (mut client, server) = duplex(256);
        let (_reader, mut writer) = StreamTransport::new(server).into_split(128);

        writer
            .write_frame(Bytes::from_static(b"hello"))
            .await
            .expect("write");
        writer.close().await.expect("close");

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.expect("read");
        assert_eq!(out, b"\0\0\0\x05hello");
    }

    #[tokio::test]
    async fn failed_frame_is_not_resent() {
        let (mut client, server) = duplex(256);
        let stream = FailFirstWrite {
            inner: server,
            failed: false,
        };
        let (_reader, mut writer) = StreamTransport::new(stream).into_split(128);

        let err = writer
            .write_frame(Bytes::from_static(b"A"))
            .await
            .expect_err("first write fails");
        assert_eq!(err.into_io().kind(), io::ErrorKind::BrokenPipe);
        writer
            .write_frame(Bytes::from_static(b"B"))
            .await
            .expect("second write");
        writer.close().await.expect("close");

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.expect("read");
        assert_eq!(out, b"\0\0\0\x01B");
    }
}
