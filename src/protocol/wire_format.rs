//! Wire format encoding and decoding.
//!
//! Implements the 8-byte CS108 packet header followed by a big-endian
//! event code and the event data:
//! ```text
//! ┌────────┬────────┬────────┬────────┬──────────┬───────────┬──────────┬────────────┬────────┐
//! │ Prefix │ Conn   │ Length │ Module │ Reserved │ Direction │ Checksum │ Event code │ Data   │
//! │ 0xA7   │ 0xB3   │ 1 byte │ 1 byte │ 0x82     │ 1 byte    │ u16 BE   │ u16 BE     │ n bytes│
//! └────────┴────────┴────────┴────────┴──────────┴───────────┴──────────┴────────────┴────────┘
//! ```
//!
//! `Length` counts every byte after the header (event code + data).
//! `Checksum` is the CRC-16/CCITT-FALSE of those same bytes.

use crate::error::{ReaderError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Size of the event code that opens every frame body.
pub const EVENT_CODE_SIZE: usize = 2;

/// First byte of every packet.
pub const PREFIX: u8 = 0xA7;

/// Connection-type byte for the Bluetooth link.
pub const CONNECTION_BLUETOOTH: u8 = 0xB3;

/// Two-byte synchronization marker.
pub const SYNC_MARKER: [u8; 2] = [PREFIX, CONNECTION_BLUETOOTH];

/// Fixed value of the reserved header byte.
pub const RESERVED: u8 = 0x82;

/// Largest declared length the reader accepts or produces.
pub const MAX_DECLARED_LENGTH: u8 = 120;

/// Largest data section of a single frame.
pub const MAX_DATA_SIZE: usize = MAX_DECLARED_LENGTH as usize - EVENT_CODE_SIZE;

/// Largest complete frame on the wire.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_DECLARED_LENGTH as usize;

/// Destination/source module identifiers.
pub mod module {
    /// RFID radio module.
    pub const RFID: u8 = 0xC2;
    /// Barcode scanner module.
    pub const BARCODE: u8 = 0x6A;
    /// Notification module (battery, trigger, errors).
    pub const NOTIFICATION: u8 = 0xD9;
    /// Silicon Labs microcontroller.
    pub const SILICON_LAB: u8 = 0xE8;
    /// Bluetooth IC.
    pub const BLUETOOTH: u8 = 0x5F;

    /// Check if a module byte is one the reader knows.
    #[inline]
    pub fn is_known(module: u8) -> bool {
        matches!(module, RFID | BARCODE | NOTIFICATION | SILICON_LAB | BLUETOOTH)
    }

    /// Human-readable module name for diagnostics.
    pub fn name(module: u8) -> &'static str {
        match module {
            RFID => "rfid",
            BARCODE => "barcode",
            NOTIFICATION => "notification",
            SILICON_LAB => "silicon_lab",
            BLUETOOTH => "bluetooth",
            _ => "unknown",
        }
    }
}

/// Direction byte values.
pub mod direction {
    /// Host to reader.
    pub const DOWNLINK: u8 = 0x37;
    /// Reader to host.
    pub const UPLINK: u8 = 0x9E;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Number of bytes following the header.
    pub length: u8,
    /// Destination (downlink) or source (uplink) module.
    pub module: u8,
    /// `direction::DOWNLINK` or `direction::UPLINK`.
    pub direction: u8,
    /// CRC of the frame body; see [`checksum`].
    pub checksum: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(length: u8, module: u8, direction: u8) -> Self {
        Self {
            length,
            module,
            direction,
            checksum: 0,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use cs108_reader::protocol::{direction, module, Header, HEADER_SIZE};
    ///
    /// let bytes = Header::new(2, module::NOTIFICATION, direction::DOWNLINK).encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..2], &[0xA7, 0xB3]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let checksum = self.checksum.to_be_bytes();
        [
            PREFIX,
            CONNECTION_BLUETOOTH,
            self.length,
            self.module,
            RESERVED,
            self.direction,
            checksum[0],
            checksum[1],
        ]
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if the buffer is too short or does not start with
    /// the sync marker. Field values are not validated; see [`Header::validate`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE || buf[..2] != SYNC_MARKER {
            return None;
        }
        Some(Self {
            length: buf[2],
            module: buf[3],
            direction: buf[5],
            checksum: u16::from_be_bytes([buf[6], buf[7]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// `raw` must be the 8 header bytes the header was decoded from; the
    /// reserved byte is checked there since it is not kept in the struct.
    pub fn validate(&self, raw: &[u8], expected_direction: u8) -> Result<()> {
        if raw.len() < HEADER_SIZE || raw[4] != RESERVED {
            return Err(invalid("reserved header byte mismatch"));
        }

        if self.direction != expected_direction {
            return Err(invalid("unexpected direction byte"));
        }

        if !module::is_known(self.module) {
            return Err(invalid("unknown module byte"));
        }

        if (self.length as usize) < EVENT_CODE_SIZE || self.length > MAX_DECLARED_LENGTH {
            return Err(invalid("declared length out of range"));
        }

        Ok(())
    }

    /// Total frame size on the wire (header + body).
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }

    /// Check the checksum field against the body that followed the header.
    #[inline]
    pub fn verify(&self, body: &[u8]) -> bool {
        self.checksum == checksum(body)
    }
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF) over a frame body.
pub fn checksum(body: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in body {
        crc ^= u16::from(b) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

fn invalid(reason: &str) -> ReaderError {
    ReaderError::Protocol(reason.to_string())
}
