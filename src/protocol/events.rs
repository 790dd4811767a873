//! Static event descriptor table.
//!
//! Every event code the reader speaks is listed here together with the
//! module it belongs to, whether the host sends it as a command and/or the
//! reader sends it unsolicited, and the rule used to decode its data.

use super::wire_format::module;

/// Byte order of a multi-byte numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// How the data section of an event is decoded into a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRule {
    /// No data expected.
    Empty,
    /// One status byte, `0x00` means success.
    Status,
    /// Unsigned integer of `width` bytes (1, 2 or 4).
    Uint { width: usize, endian: Endian },
    /// Big-endian millivolts, mapped to a battery percentage.
    BatteryPercent,
    /// Big-endian error code, optionally followed by text.
    ErrorCode,
    /// Three bytes: major, minor, build.
    Version,
    /// Opaque data kept as a byte field.
    Data,
}

/// Descriptor for one event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescriptor {
    /// Stable snake_case name used in logs and outbound events.
    pub name: &'static str,
    /// Event code on the wire.
    pub code: u16,
    /// Module the event belongs to.
    pub module: u8,
    /// Host may send this event as a command.
    pub is_command: bool,
    /// Reader may send this event unsolicited.
    pub is_notification: bool,
    /// Decode rule for the data section.
    pub rule: PayloadRule,
}

const fn command(name: &'static str, code: u16, module: u8, rule: PayloadRule) -> EventDescriptor {
    EventDescriptor {
        name,
        code,
        module,
        is_command: true,
        is_notification: false,
        rule,
    }
}

const fn notification(
    name: &'static str,
    code: u16,
    module: u8,
    rule: PayloadRule,
) -> EventDescriptor {
    EventDescriptor {
        name,
        code,
        module,
        is_command: false,
        is_notification: true,
        rule,
    }
}

pub const RFID_POWER_ON: EventDescriptor =
    command("rfid_power_on", 0x8000, module::RFID, PayloadRule::Status);
pub const RFID_POWER_OFF: EventDescriptor =
    command("rfid_power_off", 0x8001, module::RFID, PayloadRule::Status);
pub const RFID_COMMAND: EventDescriptor =
    command("rfid_command", 0x8002, module::RFID, PayloadRule::Status);
pub const RFID_UPLINK: EventDescriptor =
    notification("rfid_uplink", 0x8100, module::RFID, PayloadRule::Data);

pub const BARCODE_POWER_ON: EventDescriptor =
    command("barcode_power_on", 0x9000, module::BARCODE, PayloadRule::Status);
pub const BARCODE_POWER_OFF: EventDescriptor =
    command("barcode_power_off", 0x9001, module::BARCODE, PayloadRule::Status);
pub const BARCODE_COMMAND: EventDescriptor =
    command("barcode_command", 0x9003, module::BARCODE, PayloadRule::Status);
pub const BARCODE_DATA: EventDescriptor =
    notification("barcode_data", 0x9100, module::BARCODE, PayloadRule::Data);

/// Battery voltage: a query response, and also sent periodically once
/// auto-reporting is on.
pub const BATTERY_VOLTAGE: EventDescriptor = EventDescriptor {
    name: "battery_voltage",
    code: 0xA000,
    module: module::NOTIFICATION,
    is_command: true,
    is_notification: true,
    rule: PayloadRule::BatteryPercent,
};
pub const TRIGGER_STATE: EventDescriptor = command(
    "trigger_state",
    0xA001,
    module::NOTIFICATION,
    PayloadRule::Uint {
        width: 1,
        endian: Endian::Big,
    },
);
pub const START_BATTERY_REPORTING: EventDescriptor = command(
    "start_battery_reporting",
    0xA002,
    module::NOTIFICATION,
    PayloadRule::Status,
);
pub const STOP_BATTERY_REPORTING: EventDescriptor = command(
    "stop_battery_reporting",
    0xA003,
    module::NOTIFICATION,
    PayloadRule::Status,
);
pub const ERROR_NOTIFICATION: EventDescriptor = notification(
    "error_notification",
    0xA101,
    module::NOTIFICATION,
    PayloadRule::ErrorCode,
);
pub const TRIGGER_PRESSED: EventDescriptor =
    notification("trigger_pressed", 0xA102, module::NOTIFICATION, PayloadRule::Empty);
pub const TRIGGER_RELEASED: EventDescriptor =
    notification("trigger_released", 0xA103, module::NOTIFICATION, PayloadRule::Empty);

pub const SILICON_LAB_VERSION: EventDescriptor = command(
    "silicon_lab_version",
    0xB000,
    module::SILICON_LAB,
    PayloadRule::Version,
);
pub const BLUETOOTH_VERSION: EventDescriptor =
    command("bluetooth_version", 0xC000, module::BLUETOOTH, PayloadRule::Version);

/// All known events.
pub static EVENTS: &[EventDescriptor] = &[
    RFID_POWER_ON,
    RFID_POWER_OFF,
    RFID_COMMAND,
    RFID_UPLINK,
    BARCODE_POWER_ON,
    BARCODE_POWER_OFF,
    BARCODE_COMMAND,
    BARCODE_DATA,
    BATTERY_VOLTAGE,
    TRIGGER_STATE,
    START_BATTERY_REPORTING,
    STOP_BATTERY_REPORTING,
    ERROR_NOTIFICATION,
    TRIGGER_PRESSED,
    TRIGGER_RELEASED,
    SILICON_LAB_VERSION,
    BLUETOOTH_VERSION,
];

/// Look up an event descriptor by code.
pub fn lookup(code: u16) -> Option<&'static EventDescriptor> {
    EVENTS.iter().find(|e| e.code == code)
}

/// Look up an event descriptor by name.
pub fn by_name(name: &str) -> Option<&'static EventDescriptor> {
    EVENTS.iter().find(|e| e.name == name)
}
