//! Device error codes reported through the error notification.

/// Packet did not start with the expected prefix.
pub const WRONG_HEADER_PREFIX: u16 = 0x0000;
/// Declared payload length exceeded what the reader accepts.
pub const PAYLOAD_TOO_LARGE: u16 = 0x0001;
/// Destination module byte not recognised.
pub const UNKNOWN_TARGET: u16 = 0x0002;
/// Event code not recognised.
pub const UNKNOWN_EVENT: u16 = 0x0003;
/// Radio or power hardware fault.
pub const HARDWARE_FAILURE: u16 = 0x0010;
/// Firmware fault inside the reader.
pub const FIRMWARE_FAILURE: u16 = 0x0011;

static DESCRIPTIONS: &[(u16, &str)] = &[
    (WRONG_HEADER_PREFIX, "Wrong header prefix"),
    (PAYLOAD_TOO_LARGE, "Payload length too large"),
    (UNKNOWN_TARGET, "Unknown target module"),
    (UNKNOWN_EVENT, "Unknown event"),
    (HARDWARE_FAILURE, "Hardware failure"),
    (FIRMWARE_FAILURE, "Firmware failure"),
];

/// Description of an error code.
pub fn describe(code: u16) -> &'static str {
    DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, d)| *d)
        .unwrap_or("Unknown device error")
}
