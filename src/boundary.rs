//! Messages crossing the boundary between the core and the application.
//!
//! Outbound: timestamped [`DomainEvent`]s. Inbound: [`ReaderCommand`]s, the
//! application-level subset of requests (mode changes, sequence runs,
//! aborts). Both are serde types so they can be relayed across a process
//! or isolate boundary with [`MsgPackCodec`].
//!
//! # Example
//!
//! ```
//! use cs108_reader::boundary::{DomainEvent, EventKind};
//!
//! let event = DomainEvent::new(EventKind::BatteryUpdate { percentage: 80 });
//! let bytes = event.to_msgpack().unwrap();
//! assert_eq!(DomainEvent::from_msgpack(&bytes).unwrap().kind, event.kind);
//! ```

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::protocol::{FieldValue, Payload};
use crate::sequence::Outcome;
use crate::state::{ConnectionState, Mode};

/// Severity of a device-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Owned, serializable copy of a record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseField {
    Uint(u32),
    Bytes(Vec<u8>),
}

/// Serializable form of a command reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseValue {
    Empty,
    Scalar(u32),
    Record(BTreeMap<String, ResponseField>),
    Error { code: u16, message: String },
}

impl From<&Payload> for ResponseValue {
    fn from(payload: &Payload) -> Self {
        match payload {
            Payload::Empty => ResponseValue::Empty,
            Payload::Scalar(v) => ResponseValue::Scalar(*v),
            Payload::Structured(record) => ResponseValue::Record(
                record
                    .iter()
                    .map(|(name, value)| {
                        let field = match value {
                            FieldValue::Uint(v) => ResponseField::Uint(*v),
                            FieldValue::Bytes(b) => ResponseField::Bytes(b.to_vec()),
                        };
                        (name.to_string(), field)
                    })
                    .collect(),
            ),
            Payload::ErrorInfo { code, message } => ResponseValue::Error {
                code: *code,
                message: message.clone(),
            },
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BatteryUpdate {
        percentage: u8,
    },
    TriggerStateChanged {
        pressed: bool,
    },
    DeviceError {
        severity: Severity,
        code: u16,
        message: String,
        details: Option<String>,
    },
    CommandResponse {
        command: String,
        response: ResponseValue,
    },
    BarcodeScanned {
        data: Vec<u8>,
    },
    TagData {
        data: Vec<u8>,
    },
    ConnectionChanged {
        state: ConnectionState,
    },
    ModeChanged {
        mode: Mode,
    },
    SequenceFinished {
        sequence: String,
        outcome: Outcome,
    },
}

/// A domain event with its emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

impl DomainEvent {
    /// Stamp an event with the current wall-clock time.
    pub fn new(kind: EventKind) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { timestamp_ms, kind }
    }

    /// Encode for transfer across a process boundary.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    /// Decode an event produced by [`DomainEvent::to_msgpack`].
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}

/// Application requests that can be relayed as data.
///
/// Raw link chunks and connection notifications come from the transport
/// collaborator and go straight to the [`ReaderHandle`](crate::ReaderHandle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderCommand {
    SetMode { mode: Mode },
    RunSequence { name: String },
    Abort,
}

impl ReaderCommand {
    /// Encode for transfer across a process boundary.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    /// Decode a command produced by [`ReaderCommand::to_msgpack`].
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}
