//! Named sequences bound to reader transitions.

use super::{CommandSequence, CommandStep};
use crate::protocol::events;

/// Run once the link is up: read the Bluetooth firmware version and turn on
/// periodic battery reports.
pub fn startup() -> CommandSequence {
    CommandSequence::new(
        "startup",
        vec![
            CommandStep::new(&events::BLUETOOTH_VERSION),
            CommandStep::new(&events::START_BATTERY_REPORTING),
        ],
    )
}

/// Power down both radios, then query the trigger and the battery.
pub fn idle() -> CommandSequence {
    CommandSequence::new(
        "idle",
        vec![
            CommandStep::new(&events::RFID_POWER_OFF),
            CommandStep::new(&events::BARCODE_POWER_OFF),
            CommandStep::new(&events::TRIGGER_STATE),
            CommandStep::new(&events::BATTERY_VOLTAGE),
        ],
    )
}

pub fn inventory() -> CommandSequence {
    rfid_active("inventory")
}

pub fn locate() -> CommandSequence {
    rfid_active("locate")
}

pub fn barcode() -> CommandSequence {
    CommandSequence::new(
        "barcode",
        vec![
            CommandStep::new(&events::RFID_POWER_OFF),
            CommandStep::new(&events::BARCODE_POWER_ON),
        ],
    )
}

/// Stop battery reports and power everything down. Steps are not retried;
/// the link is usually about to go away.
pub fn shutdown() -> CommandSequence {
    CommandSequence::new(
        "shutdown",
        vec![
            CommandStep::new(&events::STOP_BATTERY_REPORTING).without_retry(),
            CommandStep::new(&events::RFID_POWER_OFF).without_retry(),
            CommandStep::new(&events::BARCODE_POWER_OFF).without_retry(),
        ],
    )
}

pub fn battery_check() -> CommandSequence {
    CommandSequence::new(
        "battery_check",
        vec![CommandStep::new(&events::BATTERY_VOLTAGE)],
    )
}

/// Look up a named sequence.
pub fn by_name(name: &str) -> Option<CommandSequence> {
    let seq = match name {
        "startup" => startup(),
        "idle" => idle(),
        "inventory" => inventory(),
        "locate" => locate(),
        "barcode" => barcode(),
        "shutdown" => shutdown(),
        "battery_check" => battery_check(),
        _ => return None,
    };
    Some(seq)
}

fn rfid_active(name: &'static str) -> CommandSequence {
    CommandSequence::new(
        name,
        vec![
            CommandStep::new(&events::BARCODE_POWER_OFF),
            CommandStep::new(&events::RFID_POWER_ON),
        ],
    )
}
