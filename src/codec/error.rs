//! Error types for the framing layer.
//!
//! # Error Categories
//!
//! - [`FramingError`]: wire-level issues in frame structure. Oversized inbound frames are
//!   recoverable; the frame is dropped and the connection keeps reading.
//! - [`EofError`]: end-of-stream conditions distinguishing clean closure from premature
//!   disconnection.
//! - [`CodecError`]: top-level enum wrapping both categories plus transport I/O errors.

use std::io;

use thiserror::Error;

/// Framing-level errors occurring during frame boundary detection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Frame length prefix indicates size exceeding configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Actual frame size indicated by the length prefix.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },
}

/// EOF handling variants distinguishing normal vs. premature closure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// Clean EOF at frame boundary - normal socket closure.
    #[error("connection closed cleanly at frame boundary")]
    CleanClose,

    /// EOF received mid-frame - premature socket closure.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Bytes received before EOF.
        bytes_received: usize,
        /// Expected frame size from the length prefix.
        expected: usize,
    },

    /// EOF received mid-header - premature socket closure.
    #[error("premature EOF: {bytes_received} bytes of {header_size} byte header received")]
    MidHeader {
        /// Bytes received before EOF.
        bytes_received: usize,
        /// Size of the length header.
        header_size: usize,
    },
}

/// Top-level codec error type.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing-level error (frame boundary detection).
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// End-of-stream condition.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),

    /// Transport failure reading or writing the socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Returns `true` for an inbound frame that was too large and has been skipped.
    ///
    /// The connection stays usable after this error.
    #[must_use]
    pub fn is_oversized(&self) -> bool {
        matches!(self, Self::Framing(FramingError::OversizedFrame { .. }))
    }

    /// Returns `true` if the peer closed the stream at a frame boundary.
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::Eof(EofError::CleanClose)) }

    /// Returns `true` for the benign "connection aborted" condition that the
    /// write path does not report.
    #[must_use]
    pub fn is_connection_aborted(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::ConnectionAborted)
    }

    /// Convert this error into an [`io::Error`], preserving the kind where possible.
    #[must_use]
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io(e) => e,
            Self::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            Self::Eof(EofError::CleanClose) => io::Error::from(io::ErrorKind::UnexpectedEof),
            Self::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}
