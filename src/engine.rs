//! Sans-IO reader engine.
//!
//! [`ReaderCore`] owns the framer, decoder, dispatcher, sequencer and state
//! machine. It never blocks and never touches a socket or a clock: callers
//! feed it inputs stamped with `now`, then drain its outputs.
//!
//! ```text
//! inputs                          outputs
//! ──────                          ───────
//! on_chunk ─► framer ─► decoder ─► dispatcher ─► drain_events
//!                              └─► sequencer ─┬► drain_transmit
//! request_mode / run_sequence ───► sequencer ─┘
//! on_timeout / on_tick                          drain_finished
//! on_connecting / on_connected / on_disconnected
//! ```
//!
//! The tokio [`Reader`](crate::Reader) actor is one driver; tests drive it
//! directly with synthetic time.

use std::mem;
use std::time::Instant;

use bytes::Bytes;

use crate::boundary::{DomainEvent, EventKind};
use crate::config::ReaderConfig;
use crate::error::{DecodeError, ReaderError, Result};
use crate::handler::{Context, Dispatcher, Metadata};
use crate::protocol::{Decoder, FrameBuffer, FramerStats, Packet};
use crate::sequence::{sequences, CommandSequence, Outcome, Sequencer, SequencerOutput};
use crate::state::{ConnectionState, Mode, ReaderState};

/// Identifies an explicitly requested sequence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// What a sequence run is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Startup,
    Mode(Mode),
    Explicit(Ticket),
}

/// The reader protocol engine.
#[derive(Debug)]
pub struct ReaderCore {
    framer: FrameBuffer,
    decoder: Decoder,
    dispatcher: Dispatcher,
    sequencer: Sequencer,
    state: ReaderState,
    metadata: Metadata,
    /// Origin of the running sequence.
    active: Option<Origin>,
    /// Sequence to start once the running one has stopped.
    queued: Option<(CommandSequence, Origin)>,
    transmit: Vec<Bytes>,
    events: Vec<DomainEvent>,
    finished: Vec<(Ticket, Outcome)>,
    next_ticket: u64,
    decode_errors: u64,
}

impl ReaderCore {
    /// Create an engine with the built-in handlers.
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            framer: FrameBuffer::with_config(config.framer.clone()),
            decoder: Decoder::new(config.battery),
            dispatcher: Dispatcher::with_system_handlers(config.rate_limit),
            sequencer: Sequencer::new(config.sequencer),
            state: ReaderState::new(),
            metadata: Metadata::default(),
            active: None,
            queued: None,
            transmit: Vec::new(),
            events: Vec::new(),
            finished: Vec::new(),
            next_ticket: 1,
            decode_errors: 0,
        }
    }

    /// Replace the dispatcher, e.g. to add application handlers.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Feed a chunk of link input.
    pub fn on_chunk(&mut self, chunk: &[u8], now: Instant) {
        for frame in self.framer.push_at(chunk, now) {
            match self.decoder.decode(&frame, now) {
                Ok(packet) => self.on_packet(&packet, now),
                Err(e) => {
                    self.decode_errors += 1;
                    // Unknown codes are reported once by the decoder itself.
                    if let DecodeError::PayloadShape { .. } = e {
                        tracing::warn!("Dropping frame: {}", e);
                    }
                }
            }
        }
    }

    /// The transport started connecting.
    pub fn on_connecting(&mut self) -> Result<()> {
        self.state.begin_connect()?;
        self.connection_changed();
        Ok(())
    }

    /// The transport link is up; runs the startup sequence.
    pub fn on_connected(&mut self, now: Instant) -> Result<()> {
        let startup = self.state.transport_connected()?;
        self.connection_changed();
        self.start(startup, Origin::Startup, now)
    }

    /// The transport dropped.
    ///
    /// Buffered bytes, the running sequence and learned metadata are
    /// discarded. Calling this while already disconnected does nothing.
    pub fn on_disconnected(&mut self) {
        if self.state.connection() == ConnectionState::Disconnected {
            return;
        }

        self.framer.clear();
        if let Some((sequence, origin)) = self.queued.take() {
            self.report(&sequence, origin, Outcome::Aborted);
        }
        if let Some(SequencerOutput::Finished { sequence, outcome }) = self.sequencer.cancel() {
            if let Some(origin) = self.active.take() {
                self.report(&sequence, origin, outcome);
            }
        }
        self.active = None;
        self.metadata = Metadata::default();
        self.state.disconnect();
        self.connection_changed();
    }

    /// Switch mode and run the mode's entry sequence.
    ///
    /// A running sequence is asked to abort first; the entry sequence starts
    /// once it has stopped. Only the latest pending request is kept.
    pub fn request_mode(&mut self, mode: Mode, now: Instant) -> Result<()> {
        let sequence = self.state.request_mode(mode)?;
        tracing::info!(?mode, "Mode changed");
        self.emit(EventKind::ModeChanged { mode });

        if self.sequencer.is_busy() {
            self.sequencer.request_abort();
            if let Some((replaced, origin)) = self.queued.replace((sequence, Origin::Mode(mode))) {
                self.report(&replaced, origin, Outcome::Aborted);
            }
            return Ok(());
        }
        self.start(sequence, Origin::Mode(mode), now)
    }

    /// Run a sequence on request; its outcome is reported under the ticket.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless connected, `SequencerBusy` if a sequence
    /// is running or queued.
    pub fn run_sequence(&mut self, sequence: CommandSequence, now: Instant) -> Result<Ticket> {
        if !self.state.accepts_commands() {
            return Err(ReaderError::InvalidTransition(format!(
                "cannot run '{}' while {:?}",
                sequence.name(),
                self.state.connection()
            )));
        }
        if let Some(current) = self.sequencer.current() {
            return Err(ReaderError::SequencerBusy(current.to_string()));
        }
        if let Some((queued, _)) = &self.queued {
            return Err(ReaderError::SequencerBusy(queued.name().to_string()));
        }

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.start(sequence, Origin::Explicit(ticket), now)?;
        Ok(ticket)
    }

    /// Run a built-in sequence by name.
    pub fn run_named(&mut self, name: &str, now: Instant) -> Result<Ticket> {
        let sequence =
            sequences::by_name(name).ok_or_else(|| ReaderError::UnknownSequence(name.to_string()))?;
        self.run_sequence(sequence, now)
    }

    /// Abort the running sequence at its next step boundary and drop any
    /// queued one. Returns `false` if nothing was running.
    pub fn abort(&mut self) -> bool {
        if let Some((sequence, origin)) = self.queued.take() {
            self.report(&sequence, origin, Outcome::Aborted);
        }
        self.sequencer.request_abort()
    }

    /// The step deadline returned by [`poll_deadline`](Self::poll_deadline) passed.
    pub fn on_timeout(&mut self, now: Instant) {
        if let Some(output) = self.sequencer.on_timeout(now) {
            self.handle_output(output, now);
        }
    }

    /// Periodic maintenance.
    pub fn on_tick(&mut self, now: Instant) {
        self.dispatcher.sweep(now);
    }

    /// When [`on_timeout`](Self::on_timeout) should next be called.
    #[inline]
    pub fn poll_deadline(&self) -> Option<Instant> {
        self.sequencer.deadline()
    }

    // ------------------------------------------------------------------
    // Outputs
    // ------------------------------------------------------------------

    /// Encoded commands to write, in order.
    pub fn drain_transmit(&mut self) -> Vec<Bytes> {
        mem::take(&mut self.transmit)
    }

    /// Domain events, in emission order.
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        mem::take(&mut self.events)
    }

    /// Outcomes of explicitly requested runs.
    pub fn drain_finished(&mut self) -> Vec<(Ticket, Outcome)> {
        mem::take(&mut self.finished)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[inline]
    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Complete frames that could not be decoded.
    #[inline]
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Name of the running sequence.
    #[inline]
    pub fn running_sequence(&self) -> Option<&str> {
        self.sequencer.current()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn on_packet(&mut self, packet: &Packet, now: Instant) {
        let mut ctx = Context::new(
            self.state.mode(),
            self.state.connection(),
            now,
            &mut self.metadata,
            &mut self.events,
        );
        self.dispatcher.dispatch(packet, &mut ctx);

        if let Some(output) = self.sequencer.on_packet(packet, now) {
            self.handle_output(output, now);
        }
    }

    fn start(&mut self, sequence: CommandSequence, origin: Origin, now: Instant) -> Result<()> {
        let output = self.sequencer.start(sequence, now)?;
        self.active = Some(origin);
        self.handle_output(output, now);
        Ok(())
    }

    fn handle_output(&mut self, output: SequencerOutput, now: Instant) {
        let (sequence, outcome) = match output {
            SequencerOutput::Transmit(bytes) => {
                self.transmit.push(bytes);
                return;
            }
            SequencerOutput::Finished { sequence, outcome } => (sequence, outcome),
        };

        let origin = match self.active.take() {
            Some(origin) => origin,
            None => return,
        };

        let bound = match origin {
            Origin::Startup => self.state.startup_finished(&outcome).map(|idle| {
                tracing::info!("Reader ready");
                (idle, Origin::Mode(Mode::Idle))
            }),
            _ => None,
        };
        let ready = bound.is_some();
        self.report(&sequence, origin, outcome);
        if ready {
            self.connection_changed();
            self.emit(EventKind::ModeChanged { mode: Mode::Idle });
        }

        if let Some((next, origin)) = bound.or_else(|| self.queued.take()) {
            if let Err(e) = self.start(next, origin, now) {
                tracing::warn!("Could not start queued sequence: {}", e);
            }
        }
    }

    fn report(&mut self, sequence: &CommandSequence, origin: Origin, outcome: Outcome) {
        if let Origin::Explicit(ticket) = origin {
            self.finished.push((ticket, outcome.clone()));
        }
        self.emit(EventKind::SequenceFinished {
            sequence: sequence.name().to_string(),
            outcome,
        });
    }

    fn connection_changed(&mut self) {
        let state = self.state.connection();
        tracing::info!(?state, "Connection state changed");
        self.emit(EventKind::ConnectionChanged { state });
    }

    fn emit(&mut self, kind: EventKind) {
        self.events.push(DomainEvent::new(kind));
    }
}

impl Default for ReaderCore {
    fn default() -> Self {
        Self::new(&ReaderConfig::default())
    }
}
