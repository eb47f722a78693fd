//! # Error Types
//!
//! Failures shared by the client and the server.
//!
//! "No data yet" on a non-blocking read is not an error and never shows up
//! here; see [`ReadOutcome::Pending`](super::connection::ReadOutcome::Pending).

use thiserror::Error;

/// Malformed or out-of-range frame header.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The payload length does not fit in the 10-digit header.
    #[error("payload of {len} bytes does not fit in a 10-byte header")]
    PayloadTooLarge { len: usize },

    /// The header is not a space-padded decimal number.
    #[error("invalid frame header {header:?}")]
    InvalidHeader { header: String },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Failure to establish or keep a connection (refused, reset, timed out).
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("connection closed")]
    Closed,
}
