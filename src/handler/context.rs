//! Per-dispatch handler context.
//!
//! A [`Context`] is built for one `handle` call and dropped right after.
//! It exposes a read-only snapshot of the reader state, the mutable
//! [`Metadata`] the handlers share, and an outbox for domain events.

use std::time::Instant;

use crate::boundary::{DomainEvent, EventKind};
use crate::state::{ConnectionState, Mode};

/// Reader facts learned from notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Last reported battery level.
    pub battery_percentage: Option<u8>,
    /// Last known trigger state.
    pub trigger_pressed: Option<bool>,
    /// Code of the most recent device error.
    pub last_error: Option<u16>,
    /// Number of barcodes seen this session.
    pub barcodes_scanned: u64,
    /// Number of RFID uplink packets seen this session.
    pub tag_packets: u64,
}

/// Context passed to a handler.
pub struct Context<'a> {
    mode: Option<Mode>,
    connection: ConnectionState,
    now: Instant,
    /// Shared reader metadata; the only state a handler may change.
    pub metadata: &'a mut Metadata,
    events: &'a mut Vec<DomainEvent>,
}

impl<'a> Context<'a> {
    /// Create a context over borrowed metadata and event outbox.
    pub fn new(
        mode: Option<Mode>,
        connection: ConnectionState,
        now: Instant,
        metadata: &'a mut Metadata,
        events: &'a mut Vec<DomainEvent>,
    ) -> Self {
        Self {
            mode,
            connection,
            now,
            metadata,
            events,
        }
    }

    #[inline]
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    #[inline]
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Time the packet is being dispatched.
    #[inline]
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Emit a domain event toward the application.
    pub fn emit(&mut self, kind: EventKind) {
        self.events.push(DomainEvent::new(kind));
    }
}
