//! Error types for cs108-reader.

use thiserror::Error;

/// Main error type for reader operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// I/O error while writing commands to the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration loading).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (header sanity check failed, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A complete frame could not be turned into a packet.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Command payload does not fit in a single frame.
    #[error("Payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// The requested transition is not valid from the current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A command sequence is already running.
    #[error("Command sequence '{0}' already running")]
    SequencerBusy(String),

    /// No built-in sequence with this name.
    #[error("Unknown sequence '{0}'")]
    UnknownSequence(String),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The reader actor or writer task has stopped.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Reasons a complete frame is dropped instead of dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Event code not present in the event table.
    #[error("Unknown event code 0x{0:04X}")]
    UnknownEvent(u16),

    /// Payload length does not match the event's decode rule.
    #[error("Event '{event}' expects {expected} payload bytes, got {actual}")]
    PayloadShape {
        event: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias using ReaderError.
pub type Result<T> = std::result::Result<T, ReaderError>;
