//! Integration tests for cs108-reader.
//!
//! These drive the engine through its public surface the way an
//! application would: link chunks in, commands and domain events out.

use std::time::{Duration, Instant};

use cs108_reader::boundary::{EventKind, ResponseValue, Severity};
use cs108_reader::codec::MsgPackCodec;
use cs108_reader::protocol::{build_frame, direction, error_codes, events, EventDescriptor};
use cs108_reader::{
    CommandSequence, CommandStep, ConnectionState, DomainEvent, Mode, Outcome, Reader,
    ReaderCommand, ReaderCore,
};
use tokio::io::{duplex, AsyncReadExt, DuplexStream};

fn uplink(event: &EventDescriptor, data: &[u8]) -> Vec<u8> {
    build_frame(event.module, direction::UPLINK, event.code, data).unwrap()
}

fn ack(event: &EventDescriptor) -> Vec<u8> {
    uplink(event, &[0x00])
}

fn kinds(core: &mut ReaderCore) -> Vec<EventKind> {
    core.drain_events().into_iter().map(|e| e.kind).collect()
}

fn sent_codes(core: &mut ReaderCore) -> Vec<u16> {
    core.drain_transmit()
        .iter()
        .map(|frame| u16::from_be_bytes([frame[8], frame[9]]))
        .collect()
}

/// What a well-behaved reader answers to a command.
fn device_reply(code: u16) -> Vec<u8> {
    match code {
        0xC000 => uplink(&events::BLUETOOTH_VERSION, &[2, 1, 7]),
        0xA001 => uplink(&events::TRIGGER_STATE, &[0]),
        0xA000 => uplink(&events::BATTERY_VOLTAGE, &3600u16.to_be_bytes()),
        code => {
            let event = events::lookup(code).unwrap();
            ack(event)
        }
    }
}

/// Bring an engine up to `Ready` by answering every command it sends.
fn connect(core: &mut ReaderCore, now: Instant) {
    core.on_connecting().unwrap();
    core.on_connected(now).unwrap();
    answer_all(core, now);
    assert_eq!(core.state().connection(), ConnectionState::Ready);
}

fn answer_all(core: &mut ReaderCore, now: Instant) {
    loop {
        let codes = sent_codes(core);
        if codes.is_empty() {
            break;
        }
        for code in codes {
            core.on_chunk(&device_reply(code), now);
        }
    }
}

/// Battery notification at 3600 mV maps to 50%.
#[test]
fn test_battery_happy_path() {
    let mut core = ReaderCore::default();
    let frame = [0xA7, 0xB3, 0x04, 0xD9, 0x82, 0x9E, 0x5F, 0x88, 0xA0, 0x00, 0x0E, 0x10];

    core.on_chunk(&frame, Instant::now());

    assert_eq!(kinds(&mut core), vec![EventKind::BatteryUpdate { percentage: 50 }]);
    assert_eq!(core.metadata().battery_percentage, Some(50));
}

/// A frame split across three link packets surfaces once, on the last.
#[test]
fn test_frame_split_across_three_chunks() {
    let mut core = ReaderCore::default();
    let now = Instant::now();
    let frame = uplink(&events::BATTERY_VOLTAGE, &4200u16.to_be_bytes());

    core.on_chunk(&frame[..3], now);
    assert!(core.drain_events().is_empty());
    core.on_chunk(&frame[3..9], now);
    assert!(core.drain_events().is_empty());
    core.on_chunk(&frame[9..], now);

    assert_eq!(kinds(&mut core), vec![EventKind::BatteryUpdate { percentage: 100 }]);
    assert_eq!(core.framer_stats().frames, 1);
}

/// Several frames merged into one link packet all surface, in order.
#[test]
fn test_merged_frames_in_one_chunk() {
    let mut core = ReaderCore::default();
    let mut chunk = uplink(&events::TRIGGER_PRESSED, &[]);
    chunk.extend(uplink(&events::BATTERY_VOLTAGE, &3000u16.to_be_bytes()));
    chunk.extend(uplink(&events::TRIGGER_RELEASED, &[]));

    core.on_chunk(&chunk, Instant::now());

    assert_eq!(
        kinds(&mut core),
        vec![
            EventKind::TriggerStateChanged { pressed: true },
            EventKind::BatteryUpdate { percentage: 0 },
            EventKind::TriggerStateChanged { pressed: false },
        ]
    );
    assert_eq!(core.metadata().trigger_pressed, Some(false));
}

/// A frame cut short by the link never produces a packet; the frame that
/// follows it still does.
#[test]
fn test_truncated_frame_never_surfaces() {
    let mut core = ReaderCore::default();
    let now = Instant::now();
    let truncated = uplink(&events::BATTERY_VOLTAGE, &4200u16.to_be_bytes());

    core.on_chunk(&truncated[..10], now);
    core.on_chunk(&uplink(&events::TRIGGER_PRESSED, &[]), now);

    assert_eq!(
        kinds(&mut core),
        vec![EventKind::TriggerStateChanged { pressed: true }]
    );
    assert_eq!(core.metadata().battery_percentage, None);
    assert_eq!(core.framer_stats().stale_frames, 1);
}

/// The next frame's marker arriving in its own link packet must not be
/// read as the tail of a truncated battery frame.
#[test]
fn test_truncated_frame_completed_by_next_marker() {
    let mut core = ReaderCore::default();
    let now = Instant::now();
    let truncated = uplink(&events::BATTERY_VOLTAGE, &3000u16.to_be_bytes());
    let next = uplink(&events::TRIGGER_PRESSED, &[]);

    core.on_chunk(&truncated[..10], now);
    core.on_chunk(&next[..2], now);
    core.on_chunk(&next[2..], now);

    assert_eq!(
        kinds(&mut core),
        vec![EventKind::TriggerStateChanged { pressed: true }]
    );
    assert_eq!(core.metadata().battery_percentage, None);
    assert_eq!(core.framer_stats().corrupt_frames, 1);
}

/// An error message cut short is never reported with foreign bytes in it.
#[test]
fn test_truncated_error_message_never_surfaces() {
    let mut core = ReaderCore::default();
    let now = Instant::now();
    let mut data = error_codes::FIRMWARE_FAILURE.to_be_bytes().to_vec();
    data.extend_from_slice(b"firmware crashed");
    let truncated = uplink(&events::ERROR_NOTIFICATION, &data);
    let next = uplink(&events::TRIGGER_PRESSED, &[]);

    core.on_chunk(&truncated[..truncated.len() - 4], now);
    core.on_chunk(&next[..4], now);
    core.on_chunk(&next[4..], now);

    assert_eq!(
        kinds(&mut core),
        vec![EventKind::TriggerStateChanged { pressed: true }]
    );
    assert_eq!(core.metadata().last_error, None);
}

/// A partial frame older than the wait limit is dropped.
#[test]
fn test_stale_partial_frame_dropped() {
    let mut core = ReaderCore::default();
    let now = Instant::now();
    let frame = uplink(&events::BATTERY_VOLTAGE, &4200u16.to_be_bytes());

    core.on_chunk(&frame[..6], now);
    core.on_chunk(&frame[6..], now + Duration::from_secs(1));

    assert!(core.drain_events().is_empty());
    assert_eq!(core.framer_stats().stale_frames, 1);
}

/// Line noise ahead of a frame is skipped.
#[test]
fn test_noise_before_frame() {
    let mut core = ReaderCore::default();
    let mut chunk = vec![0x00, 0xFF, 0xB3, 0x13, 0x37];
    chunk.extend(uplink(&events::TRIGGER_PRESSED, &[]));

    core.on_chunk(&chunk, Instant::now());

    assert_eq!(
        kinds(&mut core),
        vec![EventKind::TriggerStateChanged { pressed: true }]
    );
    assert_eq!(core.framer_stats().discarded_bytes, 5);
}

/// Unknown event codes are counted and otherwise ignored.
#[test]
fn test_unknown_event_code() {
    let mut core = ReaderCore::default();
    let frame = build_frame(0xD9, direction::UPLINK, 0xA1FF, &[1, 2]).unwrap();

    core.on_chunk(&frame, Instant::now());

    assert!(core.drain_events().is_empty());
    assert_eq!(core.decode_errors(), 1);
}

/// Connect, run startup and idle, then switch to barcode mode and scan.
#[test]
fn test_connection_flow_and_barcode_scan() {
    let now = Instant::now();
    let mut core = ReaderCore::default();

    core.on_connecting().unwrap();
    core.on_connected(now).unwrap();
    answer_all(&mut core, now);

    let seen = kinds(&mut core);
    let connection: Vec<_> = seen
        .iter()
        .filter_map(|k| match k {
            EventKind::ConnectionChanged { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        connection,
        [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Ready
        ]
    );
    assert!(seen.contains(&EventKind::ModeChanged { mode: Mode::Idle }));
    assert!(seen.contains(&EventKind::SequenceFinished {
        sequence: "startup".to_string(),
        outcome: Outcome::Completed,
    }));
    assert_eq!(core.metadata().battery_percentage, Some(50));

    // Barcode data outside barcode mode is not routed to the barcode handler.
    core.on_chunk(&uplink(&events::BARCODE_DATA, b"4006381333931"), now);
    assert!(!kinds(&mut core)
        .iter()
        .any(|k| matches!(k, EventKind::BarcodeScanned { .. })));

    core.request_mode(Mode::Barcode, now).unwrap();
    answer_all(&mut core, now);
    core.drain_events();

    core.on_chunk(&uplink(&events::BARCODE_DATA, b"4006381333931"), now);
    assert_eq!(
        kinds(&mut core),
        vec![EventKind::BarcodeScanned {
            data: b"4006381333931".to_vec()
        }]
    );
    assert_eq!(core.metadata().barcodes_scanned, 1);
}

/// Abort takes effect once the in-flight step resolves.
#[test]
fn test_sequence_abort() {
    let now = Instant::now();
    let mut core = ReaderCore::default();
    connect(&mut core, now);
    core.drain_events();

    let sequence = CommandSequence::new(
        "power_cycle",
        vec![
            CommandStep::new(&events::RFID_POWER_ON),
            CommandStep::new(&events::RFID_POWER_OFF),
            CommandStep::new(&events::RFID_POWER_ON),
        ],
    );
    let ticket = core.run_sequence(sequence, now).unwrap();
    assert_eq!(sent_codes(&mut core), [0x8000]);

    core.on_chunk(&ack(&events::RFID_POWER_ON), now);
    assert_eq!(sent_codes(&mut core), [0x8001]);

    assert!(core.abort());
    core.on_chunk(&ack(&events::RFID_POWER_OFF), now);

    assert!(core.drain_transmit().is_empty());
    assert_eq!(core.drain_finished(), vec![(ticket, Outcome::Aborted)]);
    assert!(core.running_sequence().is_none());
    assert!(!core.abort());
}

/// A rejected step is retried, then reported failed once attempts run out.
#[test]
fn test_rejected_step_retries_then_fails() {
    let now = Instant::now();
    let mut core = ReaderCore::default();
    connect(&mut core, now);

    let sequence = CommandSequence::new("rfid_on", vec![CommandStep::new(&events::RFID_POWER_ON)]);
    let ticket = core.run_sequence(sequence, now).unwrap();

    for _ in 0..2 {
        assert_eq!(sent_codes(&mut core), [0x8000]);
        core.on_chunk(&uplink(&events::RFID_POWER_ON, &[0x01]), now);
    }
    assert_eq!(sent_codes(&mut core), [0x8000]);
    core.on_chunk(&uplink(&events::RFID_POWER_ON, &[0x01]), now);

    assert!(core.drain_transmit().is_empty());
    let finished = core.drain_finished();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].0, ticket);
    assert!(matches!(
        finished[0].1,
        Outcome::FailedAtStep { index: 0, .. }
    ));
}

/// Steps marked without retry fail on the first timeout.
#[test]
fn test_no_retry_step_fails_on_first_timeout() {
    let now = Instant::now();
    let mut core = ReaderCore::default();
    connect(&mut core, now);

    let sequence = CommandSequence::new(
        "once",
        vec![CommandStep::new(&events::BARCODE_POWER_ON).without_retry()],
    );
    let ticket = core.run_sequence(sequence, now).unwrap();
    sent_codes(&mut core);

    let deadline = core.poll_deadline().unwrap();
    assert_eq!(deadline, now + Duration::from_millis(2000));
    core.on_timeout(deadline);

    assert!(core.drain_transmit().is_empty());
    let finished = core.drain_finished();
    assert_eq!(finished[0].0, ticket);
    assert!(!finished[0].1.is_completed());
}

/// Every error notification becomes an event; only logging is limited.
#[test]
fn test_error_rate_limit_burst() {
    let mut core = ReaderCore::default();
    let now = Instant::now();
    let frame = uplink(&events::ERROR_NOTIFICATION, &error_codes::HARDWARE_FAILURE.to_be_bytes());

    for _ in 0..4 {
        core.on_chunk(&frame, now);
    }

    let errors: Vec<_> = kinds(&mut core)
        .into_iter()
        .filter_map(|k| match k {
            EventKind::DeviceError {
                severity, details, ..
            } => Some((severity, details)),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 4);
    assert!(errors.iter().all(|(s, _)| *s == Severity::Critical));
    assert_eq!(errors[0].1, None);
    assert_eq!(errors[3].1.as_deref(), Some("occurrence 4"));

    let diagnostics = core.dispatcher().error_handler().unwrap().diagnostics();
    assert_eq!(diagnostics.logged, 3);
    assert_eq!(diagnostics.suppressed, 1);
    assert_eq!(core.metadata().last_error, Some(error_codes::HARDWARE_FAILURE));
}

/// The same input always reaches the same handler.
#[test]
fn test_dispatch_is_deterministic() {
    let now = Instant::now();
    let inputs = [
        uplink(&events::BATTERY_VOLTAGE, &3900u16.to_be_bytes()),
        uplink(&events::TRIGGER_STATE, &[1]),
        uplink(&events::SILICON_LAB_VERSION, &[1, 0, 4]),
        uplink(&events::ERROR_NOTIFICATION, &[0x00, 0x11]),
    ];

    let run = || {
        let mut core = ReaderCore::default();
        for input in &inputs {
            core.on_chunk(input, now);
        }
        kinds(&mut core)
    };

    let first = run();
    assert_eq!(first, run());
    assert_eq!(first[0], EventKind::BatteryUpdate { percentage: 75 });
    assert_eq!(first[1], EventKind::TriggerStateChanged { pressed: true });
    assert!(matches!(
        &first[3],
        EventKind::CommandResponse { command, response: ResponseValue::Record(_) }
            if command == "silicon_lab_version"
    ));
}

/// Disconnecting mid-sequence aborts it and forgets learned metadata.
#[test]
fn test_disconnect_mid_sequence() {
    let now = Instant::now();
    let mut core = ReaderCore::default();
    connect(&mut core, now);

    let ticket = core.run_named("battery_check", now).unwrap();
    core.on_disconnected();
    core.on_disconnected();

    assert_eq!(core.drain_finished(), vec![(ticket, Outcome::Aborted)]);
    assert_eq!(core.state().connection(), ConnectionState::Disconnected);
    assert_eq!(core.metadata().battery_percentage, None);
}

/// Domain events cross the boundary as named MessagePack maps.
#[test]
fn test_events_cross_boundary_as_msgpack() {
    let mut core = ReaderCore::default();
    core.on_chunk(&uplink(&events::TRIGGER_PRESSED, &[]), Instant::now());
    let event = core.drain_events().remove(0);

    let bytes = event.to_msgpack().unwrap();
    let decoded: DomainEvent = MsgPackCodec::decode(&bytes).unwrap();
    assert_eq!(decoded, event);
}

// ── Async reader ──────────────────────────────────────────────────────

/// Answer every command the reader writes, like the real device would.
async fn simulate_device(mut link: DuplexStream, handle: cs108_reader::ReaderHandle) {
    let mut header = [0u8; 8];
    loop {
        if link.read_exact(&mut header).await.is_err() {
            return;
        }
        let mut body = vec![0u8; usize::from(header[2])];
        if link.read_exact(&mut body).await.is_err() {
            return;
        }
        let code = u16::from_be_bytes([body[0], body[1]]);
        if handle.chunk(device_reply(code)).await.is_err() {
            return;
        }
    }
}

async fn wait_for(reader: &mut Reader, wanted: &EventKind) {
    while let Some(event) = reader.next_event().await {
        if &event.kind == wanted {
            return;
        }
    }
    panic!("reader stopped before {:?}", wanted);
}

#[tokio::test]
async fn test_reader_against_simulated_device() {
    let (link, device) = duplex(4096);
    let mut reader = Reader::builder().spawn(link).unwrap();
    let handle = reader.handle();
    tokio::spawn(simulate_device(device, handle.clone()));

    handle.connecting().await.unwrap();
    handle.connected().await.unwrap();
    wait_for(
        &mut reader,
        &EventKind::ConnectionChanged {
            state: ConnectionState::Ready,
        },
    )
    .await;
    wait_for(
        &mut reader,
        &EventKind::SequenceFinished {
            sequence: "idle".to_string(),
            outcome: Outcome::Completed,
        },
    )
    .await;

    handle
        .apply(ReaderCommand::SetMode {
            mode: Mode::Inventory,
        })
        .await
        .unwrap();
    wait_for(
        &mut reader,
        &EventKind::SequenceFinished {
            sequence: "inventory".to_string(),
            outcome: Outcome::Completed,
        },
    )
    .await;

    assert_eq!(handle.run_named("battery_check").await.unwrap(), Outcome::Completed);

    let status = handle.status().await.unwrap();
    assert_eq!(status.connection, ConnectionState::Ready);
    assert_eq!(status.mode, Some(Mode::Inventory));
    assert_eq!(status.metadata.battery_percentage, Some(50));
    assert!(status.running_sequence.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reader_times_out_silent_device() {
    let (link, mut device) = duplex(4096);
    let mut reader = Reader::builder()
        .response_timeout(Duration::from_millis(200))
        .max_attempts(3)
        .spawn(link)
        .unwrap();
    let handle = reader.handle();

    handle.connecting().await.unwrap();
    handle.connected().await.unwrap();

    wait_for(
        &mut reader,
        &EventKind::ConnectionChanged {
            state: ConnectionState::Connected,
        },
    )
    .await;
    let finished = loop {
        match reader.next_event().await.map(|e| e.kind) {
            Some(EventKind::SequenceFinished { sequence, outcome }) => break (sequence, outcome),
            Some(_) => continue,
            None => panic!("reader stopped"),
        }
    };
    assert_eq!(finished.0, "startup");
    assert!(matches!(finished.1, Outcome::FailedAtStep { index: 0, .. }));

    // Three attempts of the version query went out.
    let mut written = vec![0u8; 30];
    device.read_exact(&mut written).await.unwrap();
    for frame in written.chunks(10) {
        assert_eq!(&frame[8..10], &[0xC0, 0x00]);
    }

    let status = handle.status().await.unwrap();
    assert_eq!(status.connection, ConnectionState::Connected);
}
