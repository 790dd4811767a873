//! Frame decoder: complete frame → typed packet.
//!
//! Looks up the event descriptor for the frame's event code and applies the
//! descriptor's [`PayloadRule`] to the data section. The resulting
//! [`Payload`] is a closed union, so handlers match on it exhaustively.

use std::collections::HashSet;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error_codes;
use super::events::{self, Endian, EventDescriptor, PayloadRule};
use super::Frame;
use crate::error::DecodeError;

/// Linear battery calibration bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryCalibration {
    /// Millivolts reported at 0 %.
    pub empty_mv: u16,
    /// Millivolts reported at 100 %.
    pub full_mv: u16,
}

impl Default for BatteryCalibration {
    fn default() -> Self {
        Self {
            empty_mv: 3000,
            full_mv: 4200,
        }
    }
}

impl BatteryCalibration {
    /// Map raw millivolts to a percentage, clamped to `0..=100` and rounded
    /// to the nearest integer.
    ///
    /// ```
    /// use cs108_reader::protocol::BatteryCalibration;
    ///
    /// let cal = BatteryCalibration::default();
    /// assert_eq!(cal.percentage(3600), 50);
    /// assert_eq!(cal.percentage(2500), 0);
    /// assert_eq!(cal.percentage(5000), 100);
    /// ```
    pub fn percentage(&self, millivolts: u16) -> u8 {
        if millivolts <= self.empty_mv {
            return 0;
        }
        if millivolts >= self.full_mv {
            return 100;
        }
        let span = u32::from(self.full_mv - self.empty_mv);
        let above = u32::from(millivolts - self.empty_mv);
        ((above * 100 + span / 2) / span) as u8
    }
}

/// One field of a structured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint(u32),
    Bytes(Bytes),
}

/// Ordered multi-field record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(&'static str, FieldValue)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, builder style.
    pub fn with(mut self, name: &'static str, value: FieldValue) -> Self {
        self.fields.push((name, value));
        self
    }

    /// Get a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Get an integer field by name.
    pub fn uint(&self, name: &str) -> Option<u32> {
        match self.get(name) {
            Some(FieldValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a byte field by name.
    pub fn bytes(&self, name: &str) -> Option<&Bytes> {
        match self.get(name) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// Iterate fields in decode order.
    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.fields.iter()
    }
}

/// Decoded payload of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No data.
    Empty,
    /// Single unsigned value (status byte, trigger state, battery percent).
    Scalar(u32),
    /// Multi-field record.
    Structured(Record),
    /// Device-reported error.
    ErrorInfo { code: u16, message: String },
}

impl Payload {
    /// Scalar value, if this is a scalar payload.
    pub fn scalar(&self) -> Option<u32> {
        match self {
            Payload::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// Decoded, typed representation of one frame.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Descriptor for the frame's event code.
    pub event: &'static EventDescriptor,
    /// Decoded payload.
    pub payload: Payload,
    /// Raw frame bytes.
    pub raw: Bytes,
    /// When the frame completed.
    pub received_at: Instant,
}

impl Packet {
    /// Status byte, for events whose reply is a status byte.
    pub fn status(&self) -> Option<u8> {
        match (self.event.rule, &self.payload) {
            (PayloadRule::Status, Payload::Scalar(v)) => Some(*v as u8),
            _ => None,
        }
    }

    /// Check if this packet is a reply to `event`.
    #[inline]
    pub fn answers(&self, event: &EventDescriptor) -> bool {
        self.event.code == event.code
    }
}

/// Turns frames into packets.
#[derive(Debug, Default)]
pub struct Decoder {
    calibration: BatteryCalibration,
    reported_unknown: HashSet<u16>,
}

impl Decoder {
    /// Create a decoder with the given battery calibration.
    pub fn new(calibration: BatteryCalibration) -> Self {
        Self {
            calibration,
            reported_unknown: HashSet::new(),
        }
    }

    /// Decode a complete frame.
    ///
    /// Unknown event codes are logged the first time they are seen.
    pub fn decode(&mut self, frame: &Frame, received_at: Instant) -> Result<Packet, DecodeError> {
        let event = match events::lookup(frame.event_code()) {
            Some(e) => e,
            None => {
                if self.reported_unknown.insert(frame.event_code()) {
                    tracing::warn!(
                        module = super::module::name(frame.module()),
                        "Dropping frame with unknown event code 0x{:04X}",
                        frame.event_code()
                    );
                }
                return Err(DecodeError::UnknownEvent(frame.event_code()));
            }
        };

        let payload = self.decode_payload(event, &frame.payload)?;

        Ok(Packet {
            event,
            payload,
            raw: frame.raw.clone(),
            received_at,
        })
    }

    fn decode_payload(&self, event: &'static EventDescriptor, data: &Bytes) -> Result<Payload, DecodeError> {
        let shape = |expected: usize| DecodeError::PayloadShape {
            event: event.name,
            expected,
            actual: data.len(),
        };

        match event.rule {
            PayloadRule::Empty => Ok(Payload::Empty),
            PayloadRule::Status => match data.first() {
                Some(status) => Ok(Payload::Scalar(u32::from(*status))),
                None => Err(shape(1)),
            },
            PayloadRule::Uint { width, endian } => {
                let bytes = data.get(..width).ok_or_else(|| shape(width))?;
                read_uint(bytes, endian).map(Payload::Scalar).ok_or_else(|| shape(width))
            }
            PayloadRule::BatteryPercent => {
                let bytes = data.get(..2).ok_or_else(|| shape(2))?;
                let millivolts = u16::from_be_bytes([bytes[0], bytes[1]]);
                Ok(Payload::Scalar(u32::from(self.calibration.percentage(millivolts))))
            }
            PayloadRule::ErrorCode => {
                let bytes = data.get(..2).ok_or_else(|| shape(2))?;
                let code = u16::from_be_bytes([bytes[0], bytes[1]]);
                let text = String::from_utf8_lossy(&data[2..]);
                let text = text.trim_end_matches('\0').trim();
                let message = if text.is_empty() {
                    error_codes::describe(code).to_string()
                } else {
                    text.to_string()
                };
                Ok(Payload::ErrorInfo { code, message })
            }
            PayloadRule::Version => {
                let bytes = data.get(..3).ok_or_else(|| shape(3))?;
                Ok(Payload::Structured(
                    Record::new()
                        .with("major", FieldValue::Uint(u32::from(bytes[0])))
                        .with("minor", FieldValue::Uint(u32::from(bytes[1])))
                        .with("build", FieldValue::Uint(u32::from(bytes[2]))),
                ))
            }
            PayloadRule::Data => Ok(Payload::Structured(
                Record::new().with("data", FieldValue::Bytes(data.clone())),
            )),
        }
    }
}

fn read_uint(bytes: &[u8], endian: Endian) -> Option<u32> {
    let value = match (bytes.len(), endian) {
        (1, _) => u32::from(bytes[0]),
        (2, Endian::Big) => u32::from(u16::from_be_bytes([bytes[0], bytes[1]])),
        (2, Endian::Little) => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        (4, Endian::Big) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        (4, Endian::Little) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => return None,
    };
    Some(value)
}
