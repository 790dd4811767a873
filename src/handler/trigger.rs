use super::{Context, Handler};
use crate::boundary::{EventKind, ResponseValue};
use crate::protocol::{events, Packet};

/// Unsolicited trigger press or release.
#[derive(Debug)]
pub struct TriggerEdgeHandler {
    pressed: bool,
}

impl TriggerEdgeHandler {
    pub fn pressed() -> Self {
        Self { pressed: true }
    }

    pub fn released() -> Self {
        Self { pressed: false }
    }
}

impl Handler for TriggerEdgeHandler {
    fn name(&self) -> &'static str {
        if self.pressed {
            "trigger_pressed"
        } else {
            "trigger_released"
        }
    }

    fn can_handle(&self, packet: &Packet, _ctx: &Context<'_>) -> bool {
        let event = if self.pressed {
            &events::TRIGGER_PRESSED
        } else {
            &events::TRIGGER_RELEASED
        };
        packet.answers(event)
    }

    fn handle(&mut self, _packet: &Packet, ctx: &mut Context<'_>) {
        ctx.metadata.trigger_pressed = Some(self.pressed);
        ctx.emit(EventKind::TriggerStateChanged {
            pressed: self.pressed,
        });
    }
}

/// Reply to a trigger state query.
///
/// Emits the state change and a `CommandResponse` for the query, so the
/// polled and the pushed trigger state reach the application the same way.
#[derive(Debug, Default)]
pub struct TriggerStateHandler;

impl Handler for TriggerStateHandler {
    fn name(&self) -> &'static str {
        "trigger_state"
    }

    fn can_handle(&self, packet: &Packet, _ctx: &Context<'_>) -> bool {
        packet.answers(&events::TRIGGER_STATE) && matches!(packet.payload.scalar(), Some(0 | 1))
    }

    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>) {
        let Some(state) = packet.payload.scalar() else {
            return;
        };
        let pressed = state == 1;

        ctx.metadata.trigger_pressed = Some(pressed);
        ctx.emit(EventKind::TriggerStateChanged { pressed });
        ctx.emit(EventKind::CommandResponse {
            command: packet.event.name.to_string(),
            response: ResponseValue::Scalar(state),
        });
    }
}
