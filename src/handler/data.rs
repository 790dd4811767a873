use super::{Context, Handler};
use crate::boundary::{EventKind, ResponseValue};
use crate::protocol::{events, Packet, Payload};
use crate::state::Mode;

fn data_field(packet: &Packet) -> Option<Vec<u8>> {
    match &packet.payload {
        Payload::Structured(record) => record.bytes("data").map(|b| b.to_vec()),
        _ => None,
    }
}

/// Decoded barcodes; only meaningful while in barcode mode.
#[derive(Debug, Default)]
pub struct BarcodeHandler;

impl Handler for BarcodeHandler {
    fn name(&self) -> &'static str {
        "barcode_data"
    }

    fn can_handle(&self, packet: &Packet, ctx: &Context<'_>) -> bool {
        packet.answers(&events::BARCODE_DATA) && ctx.mode() == Some(Mode::Barcode)
    }

    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>) {
        if let Some(data) = data_field(packet) {
            ctx.metadata.barcodes_scanned += 1;
            ctx.emit(EventKind::BarcodeScanned { data });
        }
    }
}

/// RFID uplink data, passed through while inventorying or locating.
#[derive(Debug, Default)]
pub struct TagDataHandler;

impl Handler for TagDataHandler {
    fn name(&self) -> &'static str {
        "tag_data"
    }

    fn can_handle(&self, packet: &Packet, ctx: &Context<'_>) -> bool {
        packet.answers(&events::RFID_UPLINK)
            && matches!(ctx.mode(), Some(Mode::Inventory | Mode::Locate))
    }

    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>) {
        if let Some(data) = data_field(packet) {
            ctx.metadata.tag_packets += 1;
            ctx.emit(EventKind::TagData { data });
        }
    }
}

/// Any command reply not claimed by an earlier handler.
#[derive(Debug, Default)]
pub struct CommandAckHandler;

impl Handler for CommandAckHandler {
    fn name(&self) -> &'static str {
        "command_ack"
    }

    fn can_handle(&self, packet: &Packet, _ctx: &Context<'_>) -> bool {
        packet.event.is_command
    }

    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>) {
        ctx.emit(EventKind::CommandResponse {
            command: packet.event.name.to_string(),
            response: ResponseValue::from(&packet.payload),
        });
    }
}
