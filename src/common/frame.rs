//! # Frame Codec
//!
//! Every message on the wire, in both directions, is a frame:
//!
//! ```text
//! [10 bytes: payload length, ASCII decimal, left-justified, space-padded] [N bytes: payload]
//! ```
//!
//! A chat message is two frames back to back, the sender's identity and then
//! the text:
//!
//! ```text
//! "5         alice2         hi"
//! ```
//!
//! TCP does not preserve write boundaries, so readers go through
//! [`FrameBuffer`], which only hands out a frame (or a pair of frames) once
//! every byte of it has arrived.

use bytes::{Bytes, BytesMut};

use super::error::FramingError;

/// Width of the length header in bytes.
pub const HEADER_LENGTH: usize = 10;

/// Largest payload length that fits in [`HEADER_LENGTH`] decimal digits.
pub const MAX_PAYLOAD_LENGTH: u64 = 9_999_999_999;

/// Identity used by the server for the notices it synthesizes.
pub const SERVER_IDENTITY: &str = "SERVER";

/// Build the padded length header for a payload of `len` bytes.
///
/// # Example
/// ```ignore
/// assert_eq!(&encode_header(2)?, b"2         ");
/// ```
pub fn encode_header(len: usize) -> Result<[u8; HEADER_LENGTH], FramingError> {
    if len as u64 > MAX_PAYLOAD_LENGTH {
        return Err(FramingError::PayloadTooLarge { len });
    }

    let text = format!("{:<width$}", len, width = HEADER_LENGTH);
    let mut header = [0u8; HEADER_LENGTH];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

/// Encode a payload as `header || payload`.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let header = encode_header(payload.len())?;

    let mut frame = Vec::with_capacity(HEADER_LENGTH + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode an identity frame followed by a content frame into one buffer, so
/// the pair can go out in a single write.
pub fn encode_pair(identity: &[u8], content: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut bytes = encode(identity)?;
    bytes.extend_from_slice(&encode(content)?);
    Ok(bytes)
}

/// Parse a length header back into the payload length.
///
/// Surrounding whitespace is ignored. Anything other than exactly
/// [`HEADER_LENGTH`] bytes holding a non-negative decimal number is rejected.
pub fn decode_header(header: &[u8]) -> Result<usize, FramingError> {
    let invalid = || FramingError::InvalidHeader {
        header: String::from_utf8_lossy(header).into_owned(),
    };

    if header.len() != HEADER_LENGTH {
        return Err(invalid());
    }

    let text = std::str::from_utf8(header).map_err(|_| invalid())?;
    let digits = text.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    digits.parse::<usize>().map_err(|_| invalid())
}

/// A complete frame exactly as it appeared on the wire, header included.
///
/// Keeping the raw bytes lets the server relay frames without re-encoding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Bytes,
}

impl RawFrame {
    /// Header plus payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LENGTH..]
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.payload()).into_owned()
    }
}

/// An identity frame and the content frame that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    pub identity: RawFrame,
    pub content: RawFrame,
}

impl FramePair {
    /// Both frames concatenated, byte-for-byte as received.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.identity.as_bytes().len() + self.content.as_bytes().len());
        bytes.extend_from_slice(self.identity.as_bytes());
        bytes.extend_from_slice(self.content.as_bytes());
        bytes
    }
}

/// Reassembles frames from reads of arbitrary size.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet handed out.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Take the next frame if all of it is buffered.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, FramingError> {
        match complete_frame_len(&self.buf)? {
            Some(len) => Ok(Some(RawFrame {
                bytes: self.buf.split_to(len).freeze(),
            })),
            None => Ok(None),
        }
    }

    /// Take the next identity + content pair if both frames are buffered.
    ///
    /// Nothing is consumed while only the identity frame is complete.
    pub fn next_pair(&mut self) -> Result<Option<FramePair>, FramingError> {
        let Some(first) = complete_frame_len(&self.buf)? else {
            return Ok(None);
        };
        let Some(second) = complete_frame_len(&self.buf[first..])? else {
            return Ok(None);
        };

        let identity = RawFrame {
            bytes: self.buf.split_to(first).freeze(),
        };
        let content = RawFrame {
            bytes: self.buf.split_to(second).freeze(),
        };
        Ok(Some(FramePair { identity, content }))
    }
}

/// Total length of the frame at the start of `buf`, if it is fully buffered.
fn complete_frame_len(buf: &[u8]) -> Result<Option<usize>, FramingError> {
    if buf.len() < HEADER_LENGTH {
        return Ok(None);
    }

    let payload_len = decode_header(&buf[..HEADER_LENGTH])?;
    let total = HEADER_LENGTH
        .checked_add(payload_len)
        .ok_or(FramingError::PayloadTooLarge { len: payload_len })?;

    Ok((buf.len() >= total).then_some(total))
}
