//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a small state machine for fragmented frames:
//! - `Searching`: looking for the sync marker, noise ahead of it is dropped
//! - `Pending`: a marker with a sane header sits at the front, waiting for
//!   the rest of the frame
//!
//! A frame is only emitted once every byte it declares has arrived, its
//! header passed validation and its body matches the header checksum.
//!
//! The link may truncate a frame and deliver the next one right after it, so
//! the start of the next frame can fill out the truncated frame's declared
//! length. Such a window fails the checksum; its marker byte is dropped and
//! the buffered bytes are scanned again, which recovers the next frame.
//! A complete, checksum-valid frame starting inside a pending window ends the
//! pending frame early. A pending frame that sits incomplete for longer than
//! the configured wait is dropped the same way.
//!
//! # Example
//!
//! ```
//! use cs108_reader::protocol::{build_frame, direction, module, FrameBuffer};
//!
//! let bytes = build_frame(module::NOTIFICATION, direction::UPLINK, 0xA102, &[]).unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in chunks from the link
//! assert!(buffer.push(&bytes[..3]).is_empty());
//! let frames = buffer.push(&bytes[3..]);
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].event_code(), 0xA102);
//! ```

use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

use super::wire_format::{direction, Header, HEADER_SIZE, MAX_FRAME_SIZE, PREFIX, SYNC_MARKER};
use super::Frame;

/// Default time a partial frame may wait for its remaining bytes.
pub const DEFAULT_MAX_FRAME_WAIT: Duration = Duration::from_millis(500);

/// Framer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramerConfig {
    /// Direction byte frames on this stream must carry.
    pub expected_direction: u8,
    /// Milliseconds a partial frame may wait before it is dropped as truncated.
    pub max_frame_wait_ms: u64,
}

impl FramerConfig {
    /// Maximum wait as a `Duration`.
    pub fn max_frame_wait(&self) -> Duration {
        Duration::from_millis(self.max_frame_wait_ms)
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            expected_direction: direction::UPLINK,
            max_frame_wait_ms: DEFAULT_MAX_FRAME_WAIT.as_millis() as u64,
        }
    }
}

/// Counters describing what the framer did with its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Complete frames emitted.
    pub frames: u64,
    /// Bytes dropped during resynchronization.
    pub discarded_bytes: u64,
    /// Markers whose header failed validation.
    pub rejected_headers: u64,
    /// Partial frames dropped after waiting too long or being interrupted.
    pub stale_frames: u64,
    /// Complete windows dropped for a checksum mismatch.
    pub corrupt_frames: u64,
}

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// No frame start identified yet.
    Searching,
    /// Frame start at buffer front, waiting for more bytes since `since`.
    Pending { since: Instant },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// One buffer serves one device connection; call [`FrameBuffer::clear`] on
/// disconnect.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes not yet resolved into a frame.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    config: FramerConfig,
    stats: FramerStats,
}

impl FrameBuffer {
    /// Create a new frame buffer for reader → host traffic.
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    /// Create a new frame buffer with custom settings.
    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * MAX_FRAME_SIZE),
            state: State::Searching,
            config,
            stats: FramerStats::default(),
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Equivalent to [`FrameBuffer::push_at`] with the current time.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.push_at(data, Instant::now())
    }

    /// Push data received at `now` and extract all complete frames.
    ///
    /// Returns a vector of complete frames (may be empty if still waiting
    /// for data). Framing problems are never errors: noise is discarded and
    /// partial frames stay buffered.
    pub fn push_at(&mut self, data: &[u8], now: Instant) -> Vec<Frame> {
        if data.is_empty() {
            return Vec::new();
        }

        if let State::Pending { since } = self.state {
            if now.saturating_duration_since(since) > self.config.max_frame_wait() {
                tracing::warn!(
                    buffered = self.buffer.len(),
                    "Dropping partial frame that never completed"
                );
                self.stats.stale_frames += 1;
                self.discard(1);
                self.state = State::Searching;
            }
        }

        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one(now) {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self, now: Instant) -> Option<Frame> {
        loop {
            if !self.resync() {
                self.state = State::Searching;
                return None;
            }

            if self.buffer.len() < HEADER_SIZE {
                self.mark_pending(now);
                return None;
            }

            let header = match Header::decode(&self.buffer[..HEADER_SIZE]) {
                Some(h) => h,
                None => {
                    self.discard(1);
                    continue;
                }
            };

            if let Err(e) = header.validate(&self.buffer[..HEADER_SIZE], self.config.expected_direction) {
                tracing::debug!("Rejecting frame candidate: {}", e);
                self.stats.rejected_headers += 1;
                self.discard(1);
                continue;
            }

            let total = header.frame_len();
            if let Some(next) = self.interrupting_frame(total) {
                tracing::warn!(
                    discarded = next,
                    "Partial frame interrupted by a new frame header"
                );
                self.stats.stale_frames += 1;
                self.discard(next);
                self.state = State::Searching;
                continue;
            }

            if self.buffer.len() < total {
                self.mark_pending(now);
                return None;
            }

            if !header.verify(&self.buffer[HEADER_SIZE..total]) {
                tracing::warn!(
                    length = header.length,
                    "Dropping frame window with checksum mismatch"
                );
                self.stats.corrupt_frames += 1;
                self.discard(1);
                self.state = State::Searching;
                continue;
            }

            let raw = self.buffer.split_to(total).freeze();
            self.state = State::Searching;

            match Frame::from_raw(raw) {
                Some(frame) => {
                    self.stats.frames += 1;
                    return Some(frame);
                }
                None => {
                    // Header was validated above, so this window is always whole.
                    tracing::warn!("Validated frame window failed to parse");
                    continue;
                }
            }
        }
    }

    /// Drop bytes ahead of the next sync marker.
    ///
    /// Returns `true` when a marker (or a possible first marker byte at the
    /// very end) sits at the front of the buffer.
    fn resync(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }

        let found = self
            .buffer
            .windows(SYNC_MARKER.len())
            .position(|w| w == SYNC_MARKER);

        match found {
            Some(0) => true,
            Some(pos) => {
                tracing::trace!(discarded = pos, "Resynchronized on sync marker");
                self.discard(pos);
                true
            }
            None => {
                // Keep a trailing prefix byte, the marker may straddle chunks.
                let keep = usize::from(self.buffer.last() == Some(&PREFIX));
                let drop = self.buffer.len() - keep;
                if drop > 0 {
                    tracing::trace!(discarded = drop, "No sync marker in buffered data");
                    self.discard(drop);
                }
                keep == 1
            }
        }
    }

    /// Offset of a complete, checksum-valid frame that starts inside the
    /// frame at the buffer front, if any.
    ///
    /// A link-layer truncation followed by the next frame shows up exactly
    /// like this: the declared length swallows the start of the next frame.
    fn interrupting_frame(&self, total: usize) -> Option<usize> {
        let end = total.min(self.buffer.len().saturating_sub(HEADER_SIZE - 1));
        (1..end).find(|&pos| self.is_verified_frame_at(pos))
    }

    fn is_verified_frame_at(&self, pos: usize) -> bool {
        let window = &self.buffer[pos..pos + HEADER_SIZE];
        let header = match Header::decode(window) {
            Some(h) if h.validate(window, self.config.expected_direction).is_ok() => h,
            _ => return false,
        };
        self.buffer
            .get(pos + HEADER_SIZE..pos + header.frame_len())
            .map(|body| header.verify(body))
            .unwrap_or(false)
    }

    fn mark_pending(&mut self, now: Instant) {
        if let State::Searching = self.state {
            self.state = State::Pending { since: now };
        }
    }

    fn discard(&mut self, count: usize) {
        let count = count.min(self.buffer.len());
        self.buffer.advance(count);
        self.stats.discarded_bytes += count as u64;
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Searching;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Searching => "Searching",
            State::Pending { .. } => "Pending",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, module};

    fn battery_frame(millivolts: u16) -> Vec<u8> {
        build_frame(
            module::NOTIFICATION,
            direction::UPLINK,
            0xA000,
            &millivolts.to_be_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&battery_frame(3600));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_code(), 0xA000);
        assert_eq!(frames[0].payload(), &3600u16.to_be_bytes());
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().frames, 1);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = battery_frame(3000);
        combined.extend(battery_frame(3600));
        combined.extend(battery_frame(4200));

        let frames = buffer.push(&combined);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload(), &3000u16.to_be_bytes());
        assert_eq!(frames[2].payload(), &4200u16.to_be_bytes());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = battery_frame(3700);

        assert!(buffer.push(&bytes[..5]).is_empty());
        assert_eq!(buffer.state_name(), "Pending");

        let frames = buffer.push(&bytes[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.state_name(), "Searching");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let bytes = build_frame(module::BARCODE, direction::UPLINK, 0x9100, b"0123456789ABCDEF").unwrap();

        assert!(buffer.push(&bytes[..HEADER_SIZE + 4]).is_empty());
        assert_eq!(buffer.state_name(), "Pending");

        let frames = buffer.push(&bytes[HEADER_SIZE + 4..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"0123456789ABCDEF");
    }

    #[test]
    fn test_garbage_before_frame() {
        let mut buffer = FrameBuffer::new();
        let mut data = vec![0x00, 0x13, 0xA7, 0x42, 0xFF];
        data.extend(battery_frame(3600));

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.stats().discarded_bytes, 5);
    }

    #[test]
    fn test_long_garbage_is_not_retained() {
        let mut buffer = FrameBuffer::new();
        let garbage = vec![0x55u8; 64 * 1024];

        assert!(buffer.push(&garbage).is_empty());
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().discarded_bytes, garbage.len() as u64);
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut buffer = FrameBuffer::new();
        let bytes = battery_frame(3600);

        let mut first = vec![0x01, 0x02];
        first.push(bytes[0]);
        assert!(buffer.push(&first).is_empty());
        assert_eq!(buffer.len(), 1);

        let frames = buffer.push(&bytes[1..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_false_marker_is_skipped() {
        let mut buffer = FrameBuffer::new();
        // Marker followed by a header with the wrong reserved byte.
        let mut data = vec![0xA7, 0xB3, 0x02, 0xD9, 0x00, 0x9E, 0x00, 0x00];
        data.extend(battery_frame(3600));

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.stats().rejected_headers, 1);
    }

    #[test]
    fn test_downlink_frames_rejected_on_uplink_stream() {
        let mut buffer = FrameBuffer::new();
        let bytes = build_frame(module::RFID, direction::DOWNLINK, 0x8000, &[]).unwrap();

        assert!(buffer.push(&bytes).is_empty());
    }

    #[test]
    fn test_stale_partial_frame_is_dropped() {
        let mut buffer = FrameBuffer::new();
        let start = Instant::now();
        let truncated = battery_frame(3600);

        // Only the first half ever arrives.
        assert!(buffer.push_at(&truncated[..6], start).is_empty());

        // A later unrelated frame must not be glued onto the truncated one.
        let later = start + Duration::from_secs(2);
        let frames = buffer.push_at(&battery_frame(4200), later);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &4200u16.to_be_bytes());
        assert_eq!(buffer.stats().stale_frames, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_truncated_frame_followed_by_new_frame() {
        let mut buffer = FrameBuffer::new();
        let truncated = battery_frame(3600);
        let trigger = build_frame(module::NOTIFICATION, direction::UPLINK, 0xA102, &[]).unwrap();

        let mut data = truncated[..6].to_vec();
        data.extend(&trigger);

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_code(), 0xA102);
        assert_eq!(buffer.stats().stale_frames, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_slow_fragments_within_wait_complete() {
        let mut buffer = FrameBuffer::new();
        let start = Instant::now();
        let bytes = battery_frame(3900);

        assert!(buffer.push_at(&bytes[..4], start).is_empty());
        let frames = buffer.push_at(&bytes[4..], start + Duration::from_millis(100));
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.stats().stale_frames, 0);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let bytes = battery_frame(3600);
        buffer.push(&bytes[..5]);

        assert_eq!(buffer.state_name(), "Pending");
        assert_eq!(buffer.len(), 5);

        buffer.clear();

        assert_eq!(buffer.state_name(), "Searching");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = battery_frame(3600);

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(&all_frames[0].raw[..], &bytes[..]);
    }

    #[test]
    fn test_next_frame_start_glued_onto_truncated_frame() {
        let mut buffer = FrameBuffer::new();
        let truncated = battery_frame(3000);
        let trigger = build_frame(module::NOTIFICATION, direction::UPLINK, 0xA102, &[]).unwrap();

        // The marker of the next frame fills out the truncated window.
        assert!(buffer.push(&truncated[..10]).is_empty());
        assert!(buffer.push(&trigger[..2]).is_empty());
        assert_eq!(buffer.stats().corrupt_frames, 1);
        assert_eq!(buffer.len(), 2);

        let frames = buffer.push(&trigger[2..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].raw[..], &trigger[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_is_dropped() {
        let mut buffer = FrameBuffer::new();
        let mut corrupted = battery_frame(3600);
        corrupted[11] ^= 0x01;

        assert!(buffer.push(&corrupted).is_empty());
        assert_eq!(buffer.stats().corrupt_frames, 1);
        assert_eq!(buffer.stats().frames, 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_payload_with_embedded_header_stays_whole() {
        let mut buffer = FrameBuffer::new();
        // Sane header plus body, but its checksum field does not match.
        let mut data = vec![0x30, 0xA7, 0xB3, 0x02, 0xD9, 0x82, 0x9E, 0x00, 0x00, 0xA1, 0x02];
        data.extend_from_slice(b"tail");
        let bytes = build_frame(module::BARCODE, direction::UPLINK, 0x9100, &data).unwrap();

        let split = HEADER_SIZE + 3;
        assert!(buffer.push(&bytes[..split]).is_empty());
        let frames = buffer.push(&bytes[split..]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &data[..]);
        assert_eq!(buffer.stats().stale_frames, 0);
        assert_eq!(buffer.stats().corrupt_frames, 0);
    }
}
