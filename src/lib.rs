//! # cs108-reader
//!
//! Protocol engine for CS108-class handheld RFID/barcode readers.
//!
//! The reader talks over a low-bandwidth link that splits and merges
//! packets at will. This crate turns that byte stream back into frames,
//! decodes them, routes notifications to handlers, runs command sequences
//! with per-step retry, and tracks connection state and scanning mode.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): framing, event table, payload decoding
//! - **Handlers** ([`handler`]): battery, trigger, device errors, data
//! - **Sequences** ([`sequence`]): named command lists and their executor
//! - **Engine** ([`ReaderCore`]): sans-IO composition of all of the above
//! - **Actor** ([`Reader`]): tokio loop driving the engine
//!
//! Pairing, discovery and the link itself are left to the application,
//! which feeds received chunks in and supplies an `AsyncWrite` for
//! commands.
//!
//! ## Example
//!
//! ```
//! use std::time::Instant;
//! use cs108_reader::boundary::EventKind;
//! use cs108_reader::ReaderCore;
//!
//! // Battery notification at 3600 mV, split across two link packets.
//! let frame = [0xA7, 0xB3, 0x04, 0xD9, 0x82, 0x9E, 0x5F, 0x88, 0xA0, 0x00, 0x0E, 0x10];
//!
//! let mut core = ReaderCore::default();
//! core.on_chunk(&frame[..5], Instant::now());
//! core.on_chunk(&frame[5..], Instant::now());
//!
//! let events = core.drain_events();
//! assert_eq!(events[0].kind, EventKind::BatteryUpdate { percentage: 50 });
//! ```

pub mod boundary;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod sequence;
pub mod state;
pub mod writer;

mod engine;
mod reader;

pub use boundary::{DomainEvent, EventKind, ReaderCommand};
pub use config::ReaderConfig;
pub use engine::{ReaderCore, Ticket};
pub use error::{ReaderError, Result};
pub use reader::{Reader, ReaderBuilder, ReaderHandle, ReaderRequest, ReaderStatus};
pub use sequence::{CommandSequence, CommandStep, Outcome};
pub use state::{ConnectionState, Mode};
