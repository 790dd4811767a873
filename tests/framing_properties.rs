//! Property tests for frame reassembly.
//!
//! The link may split and merge frames anywhere; reassembly must not care.

use std::time::Instant;

use bytes::Bytes;
use cs108_reader::protocol::{
    build_frame, checksum, direction, events, module, FrameBuffer, CONNECTION_BLUETOOTH, PREFIX,
};
use cs108_reader::ReaderCore;
use proptest::prelude::*;

/// Data bytes with the sync marker bytes over-represented.
fn arb_data_byte() -> impl Strategy<Value = u8> {
    prop_oneof![
        4 => any::<u8>(),
        1 => Just(PREFIX),
        1 => Just(CONNECTION_BLUETOOTH),
    ]
}

/// A valid uplink frame with arbitrary data.
fn arb_frame() -> impl Strategy<Value = Vec<u8>> {
    (
        0..events::EVENTS.len(),
        proptest::collection::vec(arb_data_byte(), 0..=40),
    )
        .prop_map(|(index, data)| {
            let event = &events::EVENTS[index];
            build_frame(event.module, direction::UPLINK, event.code, &data).unwrap()
        })
}

/// Noise that never starts a frame.
fn arb_noise() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>().prop_filter("prefix byte", |b| *b != PREFIX), 0..=12)
}

/// Feed `stream` to a fresh framer in chunks of the given sizes.
fn push_chunked(stream: &[u8], sizes: &[usize]) -> Vec<Bytes> {
    let mut framer = FrameBuffer::new();
    let mut frames = Vec::new();
    let mut offset = 0;
    let mut sizes = sizes.iter().cycle();

    while offset < stream.len() {
        let size = sizes.next().copied().unwrap_or(stream.len());
        let end = (offset + size).min(stream.len());
        frames.extend(framer.push(&stream[offset..end]).into_iter().map(|f| f.raw));
        offset = end;
    }
    frames
}

#[test]
fn test_marker_bytes_in_payload_at_every_split() {
    let data = [0x41, PREFIX, CONNECTION_BLUETOOTH, 0x42, PREFIX, CONNECTION_BLUETOOTH];
    let frame = build_frame(module::BARCODE, direction::UPLINK, 0x9100, &data).unwrap();

    for split in 1..frame.len() {
        let frames = push_chunked(&frame, &[split, frame.len()]);
        assert_eq!(frames, vec![Bytes::from(frame.clone())], "split at {}", split);
    }
}

proptest! {
    /// Any chunking of a frame stream yields exactly the original frames.
    #[test]
    fn chunking_does_not_change_frames(
        frames in proptest::collection::vec(arb_frame(), 1..=8),
        sizes in proptest::collection::vec(1usize..=16, 1..=8),
    ) {
        let stream: Vec<u8> = frames.concat();
        let expected: Vec<Bytes> = frames.into_iter().map(Bytes::from).collect();

        prop_assert_eq!(push_chunked(&stream, &[stream.len()]), expected.clone());
        prop_assert_eq!(push_chunked(&stream, &sizes), expected);
    }

    /// Noise between frames is skipped without losing a frame.
    #[test]
    fn noise_between_frames_is_skipped(
        parts in proptest::collection::vec((arb_noise(), arb_frame()), 1..=6),
        sizes in proptest::collection::vec(1usize..=16, 1..=8),
    ) {
        let mut stream = Vec::new();
        let mut expected = Vec::new();
        for (noise, frame) in parts {
            stream.extend_from_slice(&noise);
            stream.extend_from_slice(&frame);
            expected.push(Bytes::from(frame));
        }

        prop_assert_eq!(push_chunked(&stream, &sizes), expected);
    }

    /// Whatever arrives, every frame that comes out is well formed.
    #[test]
    fn arbitrary_bytes_yield_only_sane_frames(
        stream in proptest::collection::vec(any::<u8>(), 0..=512),
        sizes in proptest::collection::vec(1usize..=32, 1..=8),
    ) {
        for raw in push_chunked(&stream, &sizes) {
            prop_assert_eq!(&raw[..2], &[0xA7, 0xB3]);
            prop_assert_eq!(raw.len(), 8 + usize::from(raw[2]));
            prop_assert_eq!(raw[5], direction::UPLINK);
            prop_assert_eq!(checksum(&raw[8..]), u16::from_be_bytes([raw[6], raw[7]]));
        }
    }

    /// The engine accepts arbitrary input in any connection state.
    #[test]
    fn engine_survives_arbitrary_input(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..=64), 0..=16),
    ) {
        let now = Instant::now();
        let mut core = ReaderCore::default();
        for chunk in &chunks {
            core.on_chunk(chunk, now);
        }
        core.on_connecting().unwrap();
        core.on_connected(now).unwrap();
        for chunk in &chunks {
            core.on_chunk(chunk, now);
        }
        core.drain_events();
        prop_assert!(core.state().accepts_commands());
    }
}
