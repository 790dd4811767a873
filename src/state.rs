//! Reader state machine.
//!
//! Tracks the link-level [`ConnectionState`] and the scanning [`Mode`], and
//! binds command sequences to transitions:
//!
//! ```text
//! Disconnected ─begin_connect─► Connecting ─transport_connected─► Connected
//!      ▲                                          (runs `startup`)    │
//!      │                                                startup ok    ▼
//!      └───────────────── disconnect (from any state) ───────────── Ready
//!                                                         mode: Idle ─► Inventory / Locate / Barcode / ShuttingDown
//! ```
//!
//! Handlers never touch this directly; they only see a snapshot in their
//! [`Context`](crate::handler::Context).

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};
use crate::sequence::{sequences, CommandSequence, Outcome};

/// Link-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
}

/// Scanning discipline of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Inventory,
    Locate,
    Barcode,
    ShuttingDown,
}

impl Mode {
    /// Sequence run when entering this mode.
    pub fn entry_sequence(self) -> CommandSequence {
        match self {
            Mode::Idle => sequences::idle(),
            Mode::Inventory => sequences::inventory(),
            Mode::Locate => sequences::locate(),
            Mode::Barcode => sequences::barcode(),
            Mode::ShuttingDown => sequences::shutdown(),
        }
    }
}

/// Connection state plus current mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderState {
    connection: ConnectionState,
    mode: Option<Mode>,
}

impl ReaderState {
    /// Initial state: disconnected, no mode.
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            mode: None,
        }
    }

    /// Current connection state.
    #[inline]
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Current mode, `None` until the reader is ready.
    #[inline]
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Check if commands can be sent to the reader.
    #[inline]
    pub fn accepts_commands(&self) -> bool {
        matches!(
            self.connection,
            ConnectionState::Connected | ConnectionState::Ready
        )
    }

    /// The transport started connecting.
    pub fn begin_connect(&mut self) -> Result<()> {
        self.expect(ConnectionState::Disconnected, "begin connecting")?;
        self.connection = ConnectionState::Connecting;
        Ok(())
    }

    /// The transport link is up; returns the startup sequence to run.
    pub fn transport_connected(&mut self) -> Result<CommandSequence> {
        self.expect(ConnectionState::Connecting, "complete connection")?;
        self.connection = ConnectionState::Connected;
        Ok(sequences::startup())
    }

    /// The startup sequence finished.
    ///
    /// On success the reader becomes ready in `Idle` mode and the idle entry
    /// sequence is returned. On failure the reader stays `Connected` so the
    /// application can retry or disconnect.
    pub fn startup_finished(&mut self, outcome: &Outcome) -> Option<CommandSequence> {
        if self.connection != ConnectionState::Connected || !outcome.is_completed() {
            return None;
        }
        self.connection = ConnectionState::Ready;
        self.mode = Some(Mode::Idle);
        Some(Mode::Idle.entry_sequence())
    }

    /// Switch mode; returns the mode's entry sequence.
    pub fn request_mode(&mut self, mode: Mode) -> Result<CommandSequence> {
        self.expect(ConnectionState::Ready, "change mode")?;
        if self.mode == Some(Mode::ShuttingDown) && mode != Mode::ShuttingDown {
            return Err(ReaderError::InvalidTransition(format!(
                "cannot enter {:?} while shutting down",
                mode
            )));
        }
        self.mode = Some(mode);
        Ok(mode.entry_sequence())
    }

    /// The transport dropped; terminal for the session.
    pub fn disconnect(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.mode = None;
    }

    fn expect(&self, required: ConnectionState, action: &str) -> Result<()> {
        if self.connection == required {
            Ok(())
        } else {
            Err(ReaderError::InvalidTransition(format!(
                "cannot {} while {:?}",
                action, self.connection
            )))
        }
    }
}

impl Default for ReaderState {
    fn default() -> Self {
        Self::new()
    }
}
