//! Frame struct with typed accessors.
//!
//! Represents a complete, validated protocol frame.
//! Uses `bytes::Bytes` so the payload and raw window share one allocation.
//!
//! # Example
//!
//! ```
//! use cs108_reader::protocol::{build_frame, direction, module, FrameBuffer};
//!
//! let bytes = build_frame(module::NOTIFICATION, direction::UPLINK, 0xA000, &[0x0E, 0x10]).unwrap();
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&bytes);
//!
//! assert_eq!(frames[0].event_code(), 0xA000);
//! assert_eq!(frames[0].payload(), &[0x0E, 0x10]);
//! ```

use bytes::Bytes;

use super::wire_format::{checksum, Header, EVENT_CODE_SIZE, HEADER_SIZE, MAX_DATA_SIZE};
use crate::error::{ReaderError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Event code from the first two body bytes.
    pub event_code: u16,
    /// Event data following the event code.
    pub payload: Bytes,
    /// The whole frame as received, header included.
    pub raw: Bytes,
}

impl Frame {
    /// Build a frame from its complete wire bytes.
    ///
    /// Returns `None` unless `raw` holds exactly one header-described frame.
    pub fn from_raw(raw: Bytes) -> Option<Self> {
        let header = Header::decode(&raw)?;
        if raw.len() != header.frame_len() || (header.length as usize) < EVENT_CODE_SIZE {
            return None;
        }
        let event_code = u16::from_be_bytes([raw[HEADER_SIZE], raw[HEADER_SIZE + 1]]);
        let payload = raw.slice(HEADER_SIZE + EVENT_CODE_SIZE..);
        Some(Self {
            header,
            event_code,
            payload,
            raw,
        })
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the event code.
    #[inline]
    pub fn event_code(&self) -> u16 {
        self.event_code
    }

    /// Get the module byte.
    #[inline]
    pub fn module(&self) -> u8 {
        self.header.module
    }
}

/// Build a complete frame as a single byte vector.
///
/// The declared length and checksum are computed from the payload.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the data does not fit in one frame.
pub fn build_frame(module: u8, direction: u8, event_code: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_DATA_SIZE {
        return Err(ReaderError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_DATA_SIZE,
        });
    }

    let length = (EVENT_CODE_SIZE + payload.len()) as u8;
    let mut body = Vec::with_capacity(length as usize);
    body.extend_from_slice(&event_code.to_be_bytes());
    body.extend_from_slice(payload);

    let header = Header {
        checksum: checksum(&body),
        ..Header::new(length, module, direction)
    };

    let mut buf = Vec::with_capacity(header.frame_len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&body);
    Ok(buf)
}
