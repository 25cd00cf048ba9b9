//! Length-prefixed framing for gateway sockets.
//!
//! Every frame is a 4-byte big-endian length header followed by the payload.
//! A zero-length frame is a heartbeat frame. Frames whose header announces a
//! payload larger than the configured maximum are skipped in place: the
//! decoder reports [`FramingError::OversizedFrame`] once and then silently
//! discards the announced number of bytes, so the stream stays aligned and
//! the connection can keep reading.
//!
//! # Error Handling
//!
//! [`CodecError`] separates framing errors (recoverable, only the offending
//! frame is lost), EOF conditions and transport I/O failures. See the
//! [`error`] module for details.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

pub mod error;

pub use error::{CodecError, EofError, FramingError};

/// Minimum frame length in bytes.
///
/// Frame lengths passed to [`LengthPrefixedCodec::new`] are clamped to at
/// least this value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame lengths passed to [`LengthPrefixedCodec::new`] are clamped to at most
/// this value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Default maximum payload length (64 KiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Length prefix header size (4 bytes for big-endian u32).
pub const LENGTH_HEADER_SIZE: usize = 4;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Codec turning a byte stream into payload frames and back.
///
/// Wraps `tokio_util`'s [`LengthDelimitedCodec`] and adds skip-in-place
/// handling for oversized inbound frames.
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use gatewire::codec::LengthPrefixedCodec;
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = LengthPrefixedCodec::new(1024);
/// let mut buf = BytesMut::new();
/// codec
///     .encode(Bytes::from_static(b"hello"), &mut buf)
///     .expect("encode");
/// assert_eq!(&buf[..], b"\0\0\0\x05hello");
/// let frame = codec.decode(&mut buf).expect("decode").expect("frame");
/// assert_eq!(&frame[..], b"hello");
/// ```
#[derive(Debug)]
pub struct LengthPrefixedCodec {
    inner: LengthDelimitedCodec,
    max_frame_length: usize,
    /// Bytes of an oversized frame still to be thrown away.
    discarding: usize,
}

impl LengthPrefixedCodec {
    /// Construct a codec accepting payloads up to `max_frame_length` bytes.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        let max_frame_length = clamp_frame_length(max_frame_length);
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_length)
                .new_codec(),
            max_frame_length,
            discarding: 0,
        }
    }

    /// Return the maximum payload length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Returns `true` while the remainder of an oversized frame is being skipped.
    #[must_use]
    pub fn is_discarding(&self) -> bool { self.discarding > 0 }

    fn skip_discarded(&mut self, src: &mut BytesMut) {
        let n = self.discarding.min(src.len());
        src.advance(n);
        self.discarding -= n;
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

fn peek_length(src: &BytesMut) -> Option<usize> {
    src.get(..LENGTH_HEADER_SIZE)
        .and_then(|slice| <[u8; LENGTH_HEADER_SIZE]>::try_from(slice).ok())
        .map(|bytes| u32::from_be_bytes(bytes) as usize)
}

impl Decoder for LengthPrefixedCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.is_discarding() {
            self.skip_discarded(src);
            if self.is_discarding() {
                return Ok(None);
            }
        }

        let Some(size) = peek_length(src) else {
            return Ok(None);
        };
        if size > self.max_frame_length {
            src.advance(LENGTH_HEADER_SIZE);
            self.discarding = size;
            self.skip_discarded(src);
            return Err(CodecError::Framing(FramingError::OversizedFrame {
                size,
                max: self.max_frame_length,
            }));
        }

        let needed = LENGTH_HEADER_SIZE + size;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }
        // A complete frame is buffered, so the inner codec never parks in its
        // payload state between calls.
        Ok(self.inner.decode(src)?.map(BytesMut::freeze))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.is_discarding() {
            return Err(CodecError::Eof(EofError::MidFrame {
                bytes_received: 0,
                expected: self.discarding,
            }));
        }
        if src.is_empty() {
            return Ok(None);
        }
        Err(build_eof_error(src))
    }
}

/// Build the EOF error describing a truncated trailing frame.
///
/// - [`EofError::MidHeader`]: fewer than 4 bytes received.
/// - [`EofError::MidFrame`]: header complete but payload truncated.
fn build_eof_error(src: &BytesMut) -> CodecError {
    let bytes_received = src.len();
    match peek_length(src) {
        Some(expected) => CodecError::Eof(EofError::MidFrame {
            bytes_received: bytes_received.saturating_sub(LENGTH_HEADER_SIZE),
            expected,
        }),
        None => CodecError::Eof(EofError::MidHeader {
            bytes_received,
            header_size: LENGTH_HEADER_SIZE,
        }),
    }
}

impl Encoder<Bytes> for LengthPrefixedCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_length {
            return Err(CodecError::Framing(FramingError::OversizedFrame {
                size: item.len(),
                max: self.max_frame_length,
            }));
        }
        Ok(self.inner.encode(item, dst)?)
    }
}

/// Encode a single payload into its framed wire representation.
///
/// # Errors
///
/// Returns [`FramingError::OversizedFrame`] if `payload` exceeds
/// `max_frame_length`.
pub fn encode_frame(payload: &[u8], max_frame_length: usize) -> Result<Bytes, CodecError> {
    let mut codec = LengthPrefixedCodec::new(max_frame_length);
    let mut dst = BytesMut::with_capacity(LENGTH_HEADER_SIZE + payload.len());
    codec.encode(Bytes::copy_from_slice(payload), &mut dst)?;
    Ok(dst.freeze())
}

#[cfg(test)]
mod tests;
