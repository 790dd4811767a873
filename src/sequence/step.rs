use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{build_frame, direction, EventDescriptor};

/// One command of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    /// Command to send; the reply carries the same event code.
    pub event: &'static EventDescriptor,
    /// Command data following the event code.
    pub payload: Bytes,
    /// Retry this step on timeout or negative reply.
    pub retry_on_error: bool,
}

impl CommandStep {
    /// A step with no data that is retried on failure.
    pub fn new(event: &'static EventDescriptor) -> Self {
        Self {
            event,
            payload: Bytes::new(),
            retry_on_error: true,
        }
    }

    /// Set the command data.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Fail the sequence on the first timeout or negative reply.
    pub fn without_retry(mut self) -> Self {
        self.retry_on_error = false;
        self
    }

    /// Encode as a downlink frame.
    pub fn encode(&self) -> Result<Bytes> {
        build_frame(
            self.event.module,
            direction::DOWNLINK,
            self.event.code,
            &self.payload,
        )
        .map(Bytes::from)
    }
}

/// Immutable, named, ordered list of steps. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSequence {
    name: Cow<'static, str>,
    steps: Arc<[CommandStep]>,
}

impl CommandSequence {
    /// Create a sequence.
    pub fn new(name: impl Into<Cow<'static, str>>, steps: Vec<CommandStep>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Why a step gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailure {
    /// No reply before the deadline on the last attempt.
    Timeout,
    /// The reader answered with a non-zero status byte.
    Rejected { status: u8 },
    /// The step could not be encoded.
    Encode(String),
}

/// Result of running a sequence.
///
/// A failed sequence is not rolled back: steps before `index` have already
/// taken effect on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    FailedAtStep { index: usize, reason: StepFailure },
    Aborted,
}

impl Outcome {
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}
