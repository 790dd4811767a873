//! Reader builder and actor loop.
//!
//! The [`ReaderBuilder`] configures and spawns the reader. The [`Reader`]
//! actor owns a [`ReaderCore`] and serializes everything through one loop:
//!
//! ```text
//! ReaderHandle ─┐                                  ┌─► Writer Task ─► transport
//! ReaderHandle ─┼─► mpsc<ReaderRequest> ─► Actor ──┤
//!  step timer ──┤        (one at a time)           └─► mpsc<DomainEvent> ─► application
//!  sweep tick ──┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cs108_reader::{Mode, Reader};
//!
//! # async fn demo(link: tokio::io::DuplexStream) -> cs108_reader::error::Result<()> {
//! let mut reader = Reader::builder().max_attempts(2).spawn(link)?;
//! let handle = reader.handle();
//!
//! handle.connecting().await?;
//! handle.connected().await?;
//! handle.chunk(vec![0xA7, 0xB3]).await?;
//!
//! while let Some(event) = reader.next_event().await {
//!     println!("{:?}", event.kind);
//! }
//! # handle.set_mode(Mode::Inventory).await
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::boundary::{DomainEvent, ReaderCommand};
use crate::config::ReaderConfig;
use crate::engine::{ReaderCore, Ticket};
use crate::error::{ReaderError, Result};
use crate::handler::{Dispatcher, Metadata, NotificationHandler};
use crate::protocol::{BatteryCalibration, FramerStats};
use crate::sequence::{sequences, CommandSequence, Outcome};
use crate::state::{ConnectionState, Mode};
use crate::writer::{spawn_writer_task, OutboundCommand, WriterConfig, WriterHandle};

/// Builder for configuring and spawning a reader.
pub struct ReaderBuilder {
    config: ReaderConfig,
    handlers: Vec<NotificationHandler>,
}

impl ReaderBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ReaderConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-attempt reply deadline for sequence steps.
    ///
    /// Default: 2 seconds
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.sequencer.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Attempts per retryable step, first try included.
    ///
    /// Default: 3
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.sequencer.max_attempts = attempts;
        self
    }

    /// How long a partial frame may wait for the rest of its bytes.
    ///
    /// Default: 500 ms
    pub fn max_frame_wait(mut self, wait: Duration) -> Self {
        self.config.framer.max_frame_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Millivolt bounds for the battery percentage.
    pub fn battery_calibration(mut self, calibration: BatteryCalibration) -> Self {
        self.config.battery = calibration;
        self
    }

    /// Period of the rate-limit sweep.
    ///
    /// Default: 60 seconds
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Capacity of the domain event channel. Events that find it full are
    /// dropped rather than stalling the reader.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Add a handler after the built-in ones.
    pub fn handler(mut self, handler: NotificationHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Validate the configuration and spawn the reader on the current
    /// tokio runtime. `transport` receives every encoded command.
    pub fn spawn<W>(self, transport: W) -> Result<Reader>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.config.validate()?;

        let mut dispatcher = Dispatcher::with_system_handlers(self.config.rate_limit);
        for handler in self.handlers {
            dispatcher.register(handler);
        }
        let core = ReaderCore::new(&self.config).with_dispatcher(dispatcher);

        let (writer, writer_task) = spawn_writer_task(
            transport,
            WriterConfig {
                channel_capacity: self.config.writer_capacity,
            },
        );
        let (request_tx, request_rx) = mpsc::channel(self.config.request_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity);

        let actor = Actor {
            core,
            requests: request_rx,
            events: event_tx,
            writer,
            waiters: HashMap::new(),
            sweep_interval: self.config.sweep_interval(),
            dropped_events: 0,
            overflowing: false,
        };
        let task = tokio::spawn(async move {
            let result = actor.run().await;
            // The actor dropped its writer handle; let queued commands drain.
            if let Ok(Err(e)) = writer_task.await {
                tracing::warn!("Writer task ended with error: {}", e);
            }
            result
        });

        Ok(Reader {
            handle: ReaderHandle { tx: request_tx },
            events: event_rx,
            task,
        })
    }
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStatus {
    pub connection: ConnectionState,
    pub mode: Option<Mode>,
    pub metadata: Metadata,
    pub running_sequence: Option<String>,
    pub framer: FramerStats,
    pub decode_errors: u64,
    pub dispatch_misses: u64,
    /// Events dropped because the event channel was full.
    pub dropped_events: u64,
}

/// Messages processed by the actor, strictly in arrival order.
#[derive(Debug)]
pub enum ReaderRequest {
    Chunk(Bytes),
    Connecting(oneshot::Sender<Result<()>>),
    Connected(oneshot::Sender<Result<()>>),
    Disconnected,
    SetMode(Mode, oneshot::Sender<Result<()>>),
    Run(CommandSequence, oneshot::Sender<Result<Outcome>>),
    Abort(oneshot::Sender<bool>),
    Status(oneshot::Sender<ReaderStatus>),
}

/// Cloneable handle for feeding the reader.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    tx: mpsc::Sender<ReaderRequest>,
}

impl ReaderHandle {
    /// Feed bytes received from the link.
    pub async fn chunk(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(ReaderRequest::Chunk(data.into())).await
    }

    /// The transport started connecting.
    pub async fn connecting(&self) -> Result<()> {
        self.call(ReaderRequest::Connecting).await?
    }

    /// The transport link is up; the startup sequence begins.
    pub async fn connected(&self) -> Result<()> {
        self.call(ReaderRequest::Connected).await?
    }

    /// The transport dropped.
    pub async fn disconnected(&self) -> Result<()> {
        self.send(ReaderRequest::Disconnected).await
    }

    /// Change mode. Returns once the entry sequence is started or queued.
    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        self.call(|reply| ReaderRequest::SetMode(mode, reply)).await?
    }

    /// Run a sequence and wait for its outcome.
    pub async fn run_sequence(&self, sequence: CommandSequence) -> Result<Outcome> {
        self.call(|reply| ReaderRequest::Run(sequence, reply)).await?
    }

    /// Run a built-in sequence by name and wait for its outcome.
    pub async fn run_named(&self, name: &str) -> Result<Outcome> {
        let sequence =
            sequences::by_name(name).ok_or_else(|| ReaderError::UnknownSequence(name.to_string()))?;
        self.run_sequence(sequence).await
    }

    /// Abort the running sequence at its next step boundary.
    pub async fn abort(&self) -> Result<bool> {
        self.call(ReaderRequest::Abort).await
    }

    /// Snapshot of the reader state.
    pub async fn status(&self) -> Result<ReaderStatus> {
        self.call(ReaderRequest::Status).await
    }

    /// Apply a command relayed from the application.
    ///
    /// `RunSequence` waits for the run to finish; its outcome also arrives
    /// as a `SequenceFinished` event.
    pub async fn apply(&self, command: ReaderCommand) -> Result<()> {
        match command {
            ReaderCommand::SetMode { mode } => self.set_mode(mode).await,
            ReaderCommand::RunSequence { name } => self.run_named(&name).await.map(|_| ()),
            ReaderCommand::Abort => self.abort().await.map(|_| ()),
        }
    }

    async fn send(&self, request: ReaderRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ReaderError::ConnectionClosed)
    }

    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> ReaderRequest) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(request(reply)).await?;
        rx.await.map_err(|_| ReaderError::ConnectionClosed)
    }
}

/// A running reader.
pub struct Reader {
    handle: ReaderHandle,
    events: mpsc::Receiver<DomainEvent>,
    task: JoinHandle<Result<()>>,
}

impl Reader {
    /// Create a new reader builder.
    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::new()
    }

    /// A handle for feeding the reader.
    pub fn handle(&self) -> ReaderHandle {
        self.handle.clone()
    }

    /// Next domain event; `None` once the actor has stopped.
    ///
    /// The actor never waits for the application: while the event channel is
    /// full, new events are dropped and counted in
    /// [`ReaderStatus::dropped_events`]. Sequence outcomes still reach
    /// callers of [`ReaderHandle::run_sequence`].
    pub async fn next_event(&mut self) -> Option<DomainEvent> {
        self.events.recv().await
    }

    /// Split into handle, event stream and actor task.
    pub fn into_parts(
        self,
    ) -> (
        ReaderHandle,
        mpsc::Receiver<DomainEvent>,
        JoinHandle<Result<()>>,
    ) {
        (self.handle, self.events, self.task)
    }

    /// Drop this reader's handle and wait for the actor to stop, which
    /// happens once every other handle is dropped too.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let Reader { handle, events, task } = self;
        drop(handle);
        drop(events);
        task.await.map_err(|e| ReaderError::Protocol(format!("reader task failed: {}", e)))?
    }
}

struct Actor {
    core: ReaderCore,
    requests: mpsc::Receiver<ReaderRequest>,
    events: mpsc::Sender<DomainEvent>,
    writer: WriterHandle,
    waiters: HashMap<Ticket, oneshot::Sender<Result<Outcome>>>,
    sweep_interval: Duration,
    dropped_events: u64,
    /// Set while events are being dropped; cleared by the next delivery.
    overflowing: bool,
}

impl Actor {
    async fn run(mut self) -> Result<()> {
        let mut sweep = tokio::time::interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.core.poll_deadline();

            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    self.core.on_timeout(now());
                }
                _ = sweep.tick() => {
                    self.core.on_tick(now());
                }
            }

            self.flush().await;
        }

        tracing::debug!("Reader stopped");
        Ok(())
    }

    fn handle_request(&mut self, request: ReaderRequest) {
        match request {
            ReaderRequest::Chunk(data) => self.core.on_chunk(&data, now()),
            ReaderRequest::Connecting(reply) => {
                let _ = reply.send(self.core.on_connecting());
            }
            ReaderRequest::Connected(reply) => {
                let _ = reply.send(self.core.on_connected(now()));
            }
            ReaderRequest::Disconnected => self.core.on_disconnected(),
            ReaderRequest::SetMode(mode, reply) => {
                let _ = reply.send(self.core.request_mode(mode, now()));
            }
            ReaderRequest::Run(sequence, reply) => match self.core.run_sequence(sequence, now()) {
                Ok(ticket) => {
                    self.waiters.insert(ticket, reply);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            ReaderRequest::Abort(reply) => {
                let _ = reply.send(self.core.abort());
            }
            ReaderRequest::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Push core outputs to the writer, the application and waiting callers.
    async fn flush(&mut self) {
        for bytes in self.core.drain_transmit() {
            if let Err(e) = self.writer.send(OutboundCommand::new(bytes)).await {
                tracing::warn!("Transport write failed: {}", e);
                self.core.on_disconnected();
                break;
            }
        }
        // Anything queued after a failed write has nowhere to go.
        self.core.drain_transmit();

        for (ticket, outcome) in self.core.drain_finished() {
            if let Some(reply) = self.waiters.remove(&ticket) {
                let _ = reply.send(Ok(outcome));
            }
        }

        for event in self.core.drain_events() {
            match self.events.try_send(event) {
                Ok(()) => self.overflowing = false,
                Err(TrySendError::Full(_)) => {
                    self.dropped_events += 1;
                    if !self.overflowing {
                        tracing::warn!("Event channel full, dropping events");
                        self.overflowing = true;
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!("Event receiver dropped");
                }
            }
        }
    }

    fn status(&self) -> ReaderStatus {
        ReaderStatus {
            connection: self.core.state().connection(),
            mode: self.core.state().mode(),
            metadata: self.core.metadata().clone(),
            running_sequence: self.core.running_sequence().map(str::to_string),
            framer: self.core.framer_stats(),
            decode_errors: self.core.decode_errors(),
            dispatch_misses: self.core.dispatcher().misses(),
            dropped_events: self.dropped_events,
        }
    }
}

/// Current time on the tokio clock, so paused test time drives the core.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
