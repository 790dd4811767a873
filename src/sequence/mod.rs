//! Command sequences and their executor.
//!
//! A [`CommandSequence`] is an immutable, named list of [`CommandStep`]s.
//! The [`Sequencer`] runs at most one sequence at a time: it encodes a step,
//! hands the bytes back for transmission, then waits for either the matching
//! reply packet or the step deadline before moving on.
//!
//! ```text
//! start ──► Transmit(step 0) ──ack──► Transmit(step 1) ──ack──► Finished(Completed)
//!                 │                         │
//!              timeout / nack            abort requested
//!                 ▼                         ▼
//!     retry (same step) or          Finished(Aborted)
//!     Finished(FailedAtStep)
//! ```
//!
//! The sequencer performs no I/O and owns no timer; the caller feeds it
//! packets and deadline expiries.

mod sequencer;
pub mod sequences;
mod step;

pub use sequencer::{Sequencer, SequencerConfig, SequencerOutput};
pub use step::{CommandSequence, CommandStep, Outcome, StepFailure};
