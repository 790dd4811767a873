//! Reader configuration.
//!
//! Every knob has a default; a JSON document only needs the fields it
//! changes:
//!
//! ```
//! use cs108_reader::ReaderConfig;
//!
//! let config = ReaderConfig::from_json(r#"{ "sequencer": { "max_attempts": 5 } }"#).unwrap();
//! assert_eq!(config.sequencer.max_attempts, 5);
//! assert_eq!(config.sequencer.response_timeout_ms, 2000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};
use crate::handler::RateLimitConfig;
use crate::protocol::{direction, BatteryCalibration, FramerConfig};
use crate::sequence::SequencerConfig;

/// Default capacity of the request queue into the actor.
pub const DEFAULT_REQUEST_CAPACITY: usize = 256;

/// Default capacity of the domain event channel out of the actor.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default capacity of the writer queue.
pub const DEFAULT_WRITER_CAPACITY: usize = 64;

/// Default period of the maintenance sweep.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Complete reader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub framer: FramerConfig,
    pub battery: BatteryCalibration,
    pub sequencer: SequencerConfig,
    pub rate_limit: RateLimitConfig,
    pub request_capacity: usize,
    pub event_capacity: usize,
    pub writer_capacity: usize,
    pub sweep_interval_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            framer: FramerConfig::default(),
            battery: BatteryCalibration::default(),
            sequencer: SequencerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            writer_capacity: DEFAULT_WRITER_CAPACITY,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl ReaderConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Reject configurations the reader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.battery.empty_mv >= self.battery.full_mv {
            return Err(invalid(format!(
                "battery.empty_mv ({}) must be below battery.full_mv ({})",
                self.battery.empty_mv, self.battery.full_mv
            )));
        }
        if !matches!(
            self.framer.expected_direction,
            direction::UPLINK | direction::DOWNLINK
        ) {
            return Err(invalid(format!(
                "framer.expected_direction 0x{:02X} is not a direction byte",
                self.framer.expected_direction
            )));
        }
        if self.framer.max_frame_wait_ms == 0 {
            return Err(invalid("framer.max_frame_wait_ms must be positive"));
        }
        if self.sequencer.max_attempts == 0 {
            return Err(invalid("sequencer.max_attempts must be at least 1"));
        }
        if self.sequencer.response_timeout_ms == 0 {
            return Err(invalid("sequencer.response_timeout_ms must be positive"));
        }
        if self.rate_limit.stale_after_ms < self.rate_limit.cooldown_ms {
            return Err(invalid(
                "rate_limit.stale_after_ms must not be shorter than rate_limit.cooldown_ms",
            ));
        }
        if self.request_capacity == 0 || self.event_capacity == 0 || self.writer_capacity == 0 {
            return Err(invalid("channel capacities must be positive"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(invalid("sweep_interval_ms must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ReaderError {
    ReaderError::Config(reason.into())
}
