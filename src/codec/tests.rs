//! Unit tests for the length-prefixed frame codec.
//!
//! Covers clamping, encoding, in-place skipping of oversized frames, and EOF
//! classification.

use bytes::{BufMut, Bytes, BytesMut};
use proptest::prelude::*;
use rstest::rstest;

use super::*;

fn framed(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32(u32::try_from(payload.len()).expect("payload fits in u32"));
    buf.put_slice(payload);
    buf
}

#[rstest]
#[case(0, MIN_FRAME_LENGTH)]
#[case(MIN_FRAME_LENGTH, MIN_FRAME_LENGTH)]
#[case(4096, 4096)]
#[case(MAX_FRAME_LENGTH + 1, MAX_FRAME_LENGTH)]
fn clamps_max_frame_length(#[case] requested: usize, #[case] expected: usize) {
    assert_eq!(LengthPrefixedCodec::new(requested).max_frame_length(), expected);
}

#[test]
fn encodes_big_endian_length_header() {
    let bytes = encode_frame(b"hello", 128).expect("encode");
    assert_eq!(&bytes[..], b"\0\0\0\x05hello");
}

#[test]
fn encodes_empty_payload_as_heartbeat() {
    let bytes = encode_frame(b"", 128).expect("encode");
    assert_eq!(&bytes[..], &[0, 0, 0, 0]);
}

#[test]
fn rejects_oversized_outbound_payload() {
    let err = encode_frame(&[0_u8; MIN_FRAME_LENGTH + 1], MIN_FRAME_LENGTH)
        .expect_err("oversized payload must be rejected");
    assert!(err.is_oversized());
}

#[test]
fn waits_for_complete_frame() {
    let mut codec = LengthPrefixedCodec::new(128);
    let full = framed(b"abcdef");
    let mut buf = BytesMut::from(&full[..7]);

    assert!(codec.decode(&mut buf).expect("decode").is_none());
    buf.extend_from_slice(&full[7..]);
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(&frame[..], b"abcdef");
    assert!(buf.is_empty());
}

#[test]
fn decodes_consecutive_frames_from_one_buffer() {
    let mut codec = LengthPrefixedCodec::new(128);
    let mut buf = framed(b"one");
    buf.extend_from_slice(&framed(b""));
    buf.extend_from_slice(&framed(b"two"));

    let first = codec.decode(&mut buf).expect("decode").expect("frame");
    let heartbeat = codec.decode(&mut buf).expect("decode").expect("frame");
    let second = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(&first[..], b"one");
    assert!(heartbeat.is_empty());
    assert_eq!(&second[..], b"two");
}

#[test]
fn oversized_frame_is_reported_once_then_skipped() {
    let mut codec = LengthPrefixedCodec::new(MIN_FRAME_LENGTH);
    let big = framed(&[7_u8; MIN_FRAME_LENGTH * 2]);
    let mut buf = BytesMut::from(&big[..20]);

    let err = codec.decode(&mut buf).expect_err("oversized frame");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::OversizedFrame { size, max })
            if size == MIN_FRAME_LENGTH * 2 && max == MIN_FRAME_LENGTH
    ));
    assert!(codec.is_discarding());

    // The remainder of the oversized payload arrives with a valid frame behind it.
    buf.extend_from_slice(&big[20..]);
    buf.extend_from_slice(&framed(b"next"));
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(&frame[..], b"next");
    assert!(!codec.is_discarding());
}

#[test]
fn clean_eof_at_frame_boundary_yields_none() {
    let mut codec = LengthPrefixedCodec::new(128);
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).expect("decode_eof").is_none());
}

#[test]
fn eof_mid_header_is_reported() {
    let mut codec = LengthPrefixedCodec::new(128);
    let mut buf = BytesMut::from(&[0_u8, 0][..]);
    let err = codec.decode_eof(&mut buf).expect_err("truncated header");
    assert!(matches!(
        err,
        CodecError::Eof(EofError::MidHeader {
            bytes_received: 2,
            header_size: LENGTH_HEADER_SIZE
        })
    ));
}

#[test]
fn eof_mid_frame_is_reported() {
    let mut codec = LengthPrefixedCodec::new(128);
    let full = framed(b"abcdef");
    let mut buf = BytesMut::from(&full[..6]);
    let err = codec.decode_eof(&mut buf).expect_err("truncated payload");
    assert!(matches!(
        err,
        CodecError::Eof(EofError::MidFrame {
            bytes_received: 2,
            expected: 6
        })
    ));
}

#[test]
fn io_errors_convert_with_kind() {
    let err = CodecError::from(std::io::Error::from(std::io::ErrorKind::ConnectionAborted));
    assert!(err.is_connection_aborted());
    assert_eq!(err.into_io().kind(), std::io::ErrorKind::ConnectionAborted);
}

proptest! {
    #[test]
    fn frames_survive_arbitrary_chunking(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..96), 1..8),
        chunk in 1_usize..17,
    ) {
        let mut wire = BytesMut::new();
        for payload in &payloads {
            wire.extend_from_slice(&framed(payload));
        }

        let mut codec = LengthPrefixedCodec::new(128);
        let mut buf = BytesMut::new();
        let mut decoded: Vec<Bytes> = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(frame) = codec.decode(&mut buf).expect("decode") {
                decoded.push(frame);
            }
        }

        let expected: Vec<Bytes> = payloads.into_iter().map(Bytes::from).collect();
        prop_assert_eq!(decoded, expected);
    }
}
