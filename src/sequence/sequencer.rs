use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{CommandSequence, Outcome, StepFailure};
use crate::error::{ReaderError, Result};
use crate::protocol::Packet;

/// Default time to wait for a step's reply.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2000;

/// Default number of attempts per retryable step (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Sequencer timing and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Per-attempt reply deadline.
    pub response_timeout_ms: u64,
    /// Attempts per step when `retry_on_error` is set.
    pub max_attempts: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl SequencerConfig {
    #[inline]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// What the caller must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerOutput {
    /// Send these bytes to the reader.
    Transmit(Bytes),
    /// The sequence is over.
    Finished {
        sequence: CommandSequence,
        outcome: Outcome,
    },
}

#[derive(Debug)]
struct Run {
    sequence: CommandSequence,
    current_step: usize,
    attempts: u32,
    deadline: Instant,
    abort_requested: bool,
}

/// Executes one command sequence at a time.
#[derive(Debug, Default)]
pub struct Sequencer {
    config: SequencerConfig,
    run: Option<Run>,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self { config, run: None }
    }

    /// Check if a sequence is running.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.run.is_some()
    }

    /// Name of the running sequence.
    pub fn current(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.sequence.name())
    }

    /// Deadline of the in-flight step.
    pub fn deadline(&self) -> Option<Instant> {
        self.run.as_ref().map(|r| r.deadline)
    }

    /// Start a sequence and return its first output.
    ///
    /// # Errors
    ///
    /// Returns `SequencerBusy` if another sequence is running.
    pub fn start(&mut self, sequence: CommandSequence, now: Instant) -> Result<SequencerOutput> {
        if let Some(run) = &self.run {
            return Err(ReaderError::SequencerBusy(run.sequence.name().to_string()));
        }

        tracing::debug!(sequence = sequence.name(), steps = sequence.len(), "Starting sequence");

        if sequence.is_empty() {
            return Ok(finished(sequence, Outcome::Completed));
        }

        let run = Run {
            sequence,
            current_step: 0,
            attempts: 0,
            deadline: now,
            abort_requested: false,
        };
        Ok(self.transmit(run, now))
    }

    /// Offer a packet; returns `None` unless it answers the in-flight step.
    pub fn on_packet(&mut self, packet: &Packet, now: Instant) -> Option<SequencerOutput> {
        let run = self.run.as_ref()?;
        if !packet.answers(run.sequence.steps()[run.current_step].event) {
            return None;
        }

        let run = self.run.take()?;
        let output = match packet.status() {
            Some(status) if status != 0 => {
                self.step_failed(run, StepFailure::Rejected { status }, now)
            }
            _ => self.step_succeeded(run, now),
        };
        Some(output)
    }

    /// Check the in-flight step's deadline.
    pub fn on_timeout(&mut self, now: Instant) -> Option<SequencerOutput> {
        if now < self.run.as_ref()?.deadline {
            return None;
        }
        let run = self.run.take()?;
        Some(self.step_failed(run, StepFailure::Timeout, now))
    }

    /// Ask the running sequence to stop once the in-flight step resolves.
    ///
    /// Returns `false` if nothing is running.
    pub fn request_abort(&mut self) -> bool {
        match &mut self.run {
            Some(run) => {
                run.abort_requested = true;
                true
            }
            None => false,
        }
    }

    /// Drop the running sequence immediately, without waiting for the step.
    pub fn cancel(&mut self) -> Option<SequencerOutput> {
        let run = self.run.take()?;
        tracing::info!(sequence = run.sequence.name(), "Sequence cancelled");
        Some(finished(run.sequence, Outcome::Aborted))
    }

    fn step_succeeded(&mut self, mut run: Run, now: Instant) -> SequencerOutput {
        tracing::debug!(
            sequence = run.sequence.name(),
            step = run.current_step,
            "Step acknowledged"
        );

        if run.current_step + 1 == run.sequence.len() {
            return finish(run, Outcome::Completed);
        }
        if run.abort_requested {
            return finish(run, Outcome::Aborted);
        }

        run.current_step += 1;
        run.attempts = 0;
        self.transmit(run, now)
    }

    fn step_failed(&mut self, run: Run, reason: StepFailure, now: Instant) -> SequencerOutput {
        if run.abort_requested {
            return finish(run, Outcome::Aborted);
        }

        let step = &run.sequence.steps()[run.current_step];
        if step.retry_on_error && run.attempts < self.config.max_attempts {
            tracing::debug!(
                sequence = run.sequence.name(),
                step = run.current_step,
                attempt = run.attempts,
                "Retrying step after {:?}",
                reason
            );
            return self.transmit(run, now);
        }

        let index = run.current_step;
        finish(run, Outcome::FailedAtStep { index, reason })
    }

    /// Encode the current step and arm its deadline.
    fn transmit(&mut self, mut run: Run, now: Instant) -> SequencerOutput {
        let index = run.current_step;
        match run.sequence.steps()[index].encode() {
            Ok(bytes) => {
                run.attempts += 1;
                run.deadline = now + self.config.response_timeout();
                self.run = Some(run);
                SequencerOutput::Transmit(bytes)
            }
            Err(e) => {
                let reason = StepFailure::Encode(e.to_string());
                finish(run, Outcome::FailedAtStep { index, reason })
            }
        }
    }
}

fn finish(run: Run, outcome: Outcome) -> SequencerOutput {
    match &outcome {
        Outcome::Completed => tracing::info!(sequence = run.sequence.name(), "Sequence completed"),
        Outcome::Aborted => tracing::info!(sequence = run.sequence.name(), "Sequence aborted"),
        Outcome::FailedAtStep { index, reason } => tracing::warn!(
            sequence = run.sequence.name(),
            step = index,
            "Sequence failed: {:?}",
            reason
        ),
    }
    finished(run.sequence, outcome)
}

fn finished(sequence: CommandSequence, outcome: Outcome) -> SequencerOutput {
    SequencerOutput::Finished { sequence, outcome }
}
