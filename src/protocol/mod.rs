//! Protocol module - wire format, framing, event table and decoding.
//!
//! This module implements the reader's binary protocol:
//! - 8-byte header encoding/decoding and header sanity checks
//! - Frame buffer reassembling chunked link input into frames
//! - Static event descriptor and error code tables
//! - Decoder turning frames into typed packets

mod decoder;
pub mod error_codes;
pub mod events;
mod frame;
mod frame_buffer;
mod wire_format;

pub use decoder::{BatteryCalibration, Decoder, FieldValue, Packet, Payload, Record};
pub use events::{EventDescriptor, PayloadRule};
pub use frame::{build_frame, Frame};
pub use frame_buffer::{FrameBuffer, FramerConfig, FramerStats, DEFAULT_MAX_FRAME_WAIT};
pub use wire_format::{
    checksum, direction, module, Header, CONNECTION_BLUETOOTH, EVENT_CODE_SIZE, HEADER_SIZE,
    MAX_DATA_SIZE, MAX_DECLARED_LENGTH, MAX_FRAME_SIZE, PREFIX, RESERVED, SYNC_MARKER,
};
