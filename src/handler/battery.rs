use super::{Context, Handler};
use crate::boundary::EventKind;
use crate::protocol::{events, Packet};

/// Battery reports, solicited or periodic.
///
/// The decoder has already mapped millivolts to a percentage.
#[derive(Debug, Default)]
pub struct BatteryHandler;

impl Handler for BatteryHandler {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn can_handle(&self, packet: &Packet, _ctx: &Context<'_>) -> bool {
        packet.answers(&events::BATTERY_VOLTAGE)
            && matches!(packet.payload.scalar(), Some(p) if p <= 100)
    }

    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>) {
        let Some(percentage) = packet.payload.scalar() else {
            return;
        };
        let percentage = percentage as u8;

        ctx.metadata.battery_percentage = Some(percentage);
        ctx.emit(EventKind::BatteryUpdate { percentage });
    }
}
