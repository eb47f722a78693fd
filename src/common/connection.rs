//! # Frame Reader
//!
//! Readiness-driven reading of frames from the read half of a TCP stream.
//!
//! Each call to [`FrameReader::read_pair`] is one round: wait until the socket
//! is readable, read whatever is there without blocking, and report what that
//! produced. The caller decides whether to go again. This keeps three
//! outcomes apart that a blocking reader would blur together:
//!
//! - a full identity + content pair arrived ([`ReadOutcome::Pair`])
//! - nothing complete yet, or the readiness was spurious ([`ReadOutcome::Pending`])
//! - the peer closed the stream ([`ReadOutcome::Closed`])

use std::io;

use log::debug;
use tokio::net::tcp::OwnedReadHalf;

use super::error::ChatError;
use super::frame::{FrameBuffer, FramePair, RawFrame};

/// Spare capacity reserved before each non-blocking read.
const READ_CHUNK: usize = 4096;

/// Result of one readiness round.
#[derive(Debug)]
pub enum ReadOutcome {
    Pair(FramePair),

    /// No complete pair is available yet. Not an error.
    Pending,

    /// The peer closed the stream. `mid_frame` is set when it did so with a
    /// partial frame buffered; callers treat both cases as a disconnect.
    Closed { mid_frame: bool },
}

enum Fill {
    Data,
    WouldBlock,
    Eof,
}

/// Buffered frame reader over an [`OwnedReadHalf`].
pub struct FrameReader {
    half: OwnedReadHalf,
    buffer: FrameBuffer,
}

impl FrameReader {
    pub fn new(half: OwnedReadHalf) -> Self {
        Self {
            half,
            buffer: FrameBuffer::new(),
        }
    }

    /// Run one readiness round and try to produce an identity + content pair.
    ///
    /// A pair already sitting in the buffer is returned without touching the
    /// socket. Cancel-safe: dropping the future loses no bytes.
    ///
    /// # Returns
    /// - `Ok(ReadOutcome)`: see [`ReadOutcome`]
    /// - `Err(ChatError::Framing)`: the peer sent a malformed header
    /// - `Err(ChatError::Connection)`: any I/O error other than would-block
    pub async fn read_pair(&mut self) -> Result<ReadOutcome, ChatError> {
        if let Some(pair) = self.buffer.next_pair()? {
            return Ok(ReadOutcome::Pair(pair));
        }

        match self.fill().await? {
            Fill::Eof => {
                let mid_frame = !self.buffer.is_empty();
                if mid_frame {
                    debug!(
                        "Peer closed with {} bytes of an unfinished frame buffered",
                        self.buffer.len()
                    );
                }
                Ok(ReadOutcome::Closed { mid_frame })
            }
            Fill::WouldBlock => Ok(ReadOutcome::Pending),
            Fill::Data => match self.buffer.next_pair()? {
                Some(pair) => Ok(ReadOutcome::Pair(pair)),
                None => Ok(ReadOutcome::Pending),
            },
        }
    }

    /// Read until one whole frame is available.
    ///
    /// Used for the handshake. Returns `Ok(None)` if the peer closes before
    /// the frame is complete.
    pub async fn read_frame(&mut self) -> Result<Option<RawFrame>, ChatError> {
        loop {
            if let Some(frame) = self.buffer.next_frame()? {
                return Ok(Some(frame));
            }

            if let Fill::Eof = self.fill().await? {
                return Ok(None);
            }
        }
    }

    async fn fill(&mut self) -> Result<Fill, ChatError> {
        self.half.readable().await?;

        let buf = self.buffer.buf_mut();
        buf.reserve(READ_CHUNK);

        match self.half.try_read_buf(buf) {
            Ok(0) => Ok(Fill::Eof),
            Ok(_) => Ok(Fill::Data),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Fill::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }
}
