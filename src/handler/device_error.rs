//! Device error notifications with rate-limited diagnostics.
//!
//! Every error notification becomes a `DeviceError` event. Only the log
//! output is rate limited: per error code, the first `burst` occurrences
//! are logged, later ones are logged at most once per `cooldown`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{Context, Handler};
use crate::boundary::{EventKind, Severity};
use crate::protocol::{error_codes, events, Packet, Payload};

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Occurrences per code always logged.
    pub burst: u32,
    /// Minimum spacing between logs once the burst is used up.
    pub cooldown_ms: u64,
    /// Entries unseen for this long are evicted by the sweep.
    pub stale_after_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 3,
            cooldown_ms: 5_000,
            stale_after_ms: 300_000,
        }
    }
}

/// Severity for a device error code.
pub fn severity(code: u16) -> Severity {
    match code {
        error_codes::HARDWARE_FAILURE => Severity::Critical,
        error_codes::FIRMWARE_FAILURE => Severity::Error,
        _ => Severity::Warning,
    }
}

/// Whether an occurrence should be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Log it; `suppressed` occurrences were skipped since the last log.
    Log { count: u64, suppressed: u64 },
    Suppress { count: u64 },
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u64,
    last_seen: Instant,
    last_logged: Instant,
    suppressed: u64,
}

/// Per-code occurrence bookkeeping.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: HashMap<u16, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Record one occurrence of `code`.
    pub fn record(&mut self, code: u16, now: Instant) -> Verdict {
        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        let entry = self.entries.entry(code).or_insert(RateLimitEntry {
            count: 0,
            last_seen: now,
            last_logged: now,
            suppressed: 0,
        });

        entry.count += 1;
        entry.last_seen = now;

        if entry.count <= u64::from(self.config.burst)
            || now.saturating_duration_since(entry.last_logged) >= cooldown
        {
            entry.last_logged = now;
            let suppressed = std::mem::take(&mut entry.suppressed);
            return Verdict::Log {
                count: entry.count,
                suppressed,
            };
        }

        entry.suppressed += 1;
        Verdict::Suppress { count: entry.count }
    }

    /// Evict entries unseen for the stale threshold; returns how many.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let stale = Duration::from_millis(self.config.stale_after_ms);
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_seen) < stale);
        before - self.entries.len()
    }

    /// Number of tracked codes.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counters for emitted diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorDiagnostics {
    pub logged: u64,
    pub suppressed: u64,
}

/// Handles the error notification event.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    limiter: RateLimiter,
    diagnostics: ErrorDiagnostics,
}

impl ErrorHandler {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
            diagnostics: ErrorDiagnostics::default(),
        }
    }

    #[inline]
    pub fn diagnostics(&self) -> ErrorDiagnostics {
        self.diagnostics
    }

    #[inline]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Evict stale rate-limit entries.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let evicted = self.limiter.sweep(now);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.limiter.len(), "Swept error rate limits");
        }
        evicted
    }

    fn log(&mut self, severity: Severity, code: u16, message: &str, verdict: Verdict) {
        let (count, suppressed) = match verdict {
            Verdict::Log { count, suppressed } => (count, suppressed),
            Verdict::Suppress { .. } => {
                self.diagnostics.suppressed += 1;
                return;
            }
        };
        self.diagnostics.logged += 1;

        match severity {
            Severity::Critical | Severity::Error => tracing::error!(
                ?severity,
                count,
                suppressed,
                "Device error 0x{:04X}: {}",
                code,
                message
            ),
            Severity::Warning => tracing::warn!(
                count,
                suppressed,
                "Device error 0x{:04X}: {}",
                code,
                message
            ),
        }
    }
}

impl Handler for ErrorHandler {
    fn name(&self) -> &'static str {
        "device_error"
    }

    fn can_handle(&self, packet: &Packet, _ctx: &Context<'_>) -> bool {
        packet.answers(&events::ERROR_NOTIFICATION)
            && matches!(packet.payload, Payload::ErrorInfo { .. } | Payload::Scalar(_))
    }

    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>) {
        let (code, message) = match &packet.payload {
            Payload::ErrorInfo { code, message } => (*code, message.clone()),
            Payload::Scalar(v) => {
                let code = *v as u16;
                (code, error_codes::describe(code).to_string())
            }
            _ => return,
        };

        let severity = severity(code);
        let verdict = self.limiter.record(code, ctx.now());
        self.log(severity, code, &message, verdict);

        let count = match verdict {
            Verdict::Log { count, .. } | Verdict::Suppress { count } => count,
        };

        ctx.metadata.last_error = Some(code);
        ctx.emit(EventKind::DeviceError {
            severity,
            code,
            message,
            details: (count > 1).then(|| format!("occurrence {}", count)),
        });
    }
}
