//! Ordered handler list.
//!
//! Handlers are tried in registration order; the first one whose
//! `can_handle` accepts the packet gets it, and nobody else does. Packets
//! no handler accepts are counted and dropped.

use std::time::Instant;

use super::{
    BarcodeHandler, BatteryHandler, CommandAckHandler, Context, ErrorHandler, Handler,
    RateLimitConfig, TagDataHandler, TriggerEdgeHandler, TriggerStateHandler,
};
use crate::protocol::Packet;

/// Built-in handlers plus an escape hatch for application handlers.
pub enum NotificationHandler {
    Battery(BatteryHandler),
    TriggerEdge(TriggerEdgeHandler),
    TriggerState(TriggerStateHandler),
    Error(ErrorHandler),
    Barcode(BarcodeHandler),
    TagData(TagDataHandler),
    CommandAck(CommandAckHandler),
    Custom(Box<dyn Handler + Send>),
}

impl NotificationHandler {
    fn as_handler(&self) -> &dyn Handler {
        match self {
            NotificationHandler::Battery(h) => h,
            NotificationHandler::TriggerEdge(h) => h,
            NotificationHandler::TriggerState(h) => h,
            NotificationHandler::Error(h) => h,
            NotificationHandler::Barcode(h) => h,
            NotificationHandler::TagData(h) => h,
            NotificationHandler::CommandAck(h) => h,
            NotificationHandler::Custom(h) => h.as_ref(),
        }
    }

    fn as_handler_mut(&mut self) -> &mut dyn Handler {
        match self {
            NotificationHandler::Battery(h) => h,
            NotificationHandler::TriggerEdge(h) => h,
            NotificationHandler::TriggerState(h) => h,
            NotificationHandler::Error(h) => h,
            NotificationHandler::Barcode(h) => h,
            NotificationHandler::TagData(h) => h,
            NotificationHandler::CommandAck(h) => h,
            NotificationHandler::Custom(h) => h.as_mut(),
        }
    }
}

impl std::fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NotificationHandler")
            .field(&self.as_handler().name())
            .finish()
    }
}

/// Routes packets to handlers.
#[derive(Debug, Default)]
pub struct Dispatcher {
    handlers: Vec<NotificationHandler>,
    misses: u64,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher with the built-in handlers in their fixed order.
    pub fn with_system_handlers(rate_limit: RateLimitConfig) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(NotificationHandler::Battery(BatteryHandler));
        dispatcher.register(NotificationHandler::TriggerEdge(TriggerEdgeHandler::pressed()));
        dispatcher.register(NotificationHandler::TriggerEdge(TriggerEdgeHandler::released()));
        dispatcher.register(NotificationHandler::TriggerState(TriggerStateHandler));
        dispatcher.register(NotificationHandler::Error(ErrorHandler::new(rate_limit)));
        dispatcher.register(NotificationHandler::Barcode(BarcodeHandler));
        dispatcher.register(NotificationHandler::TagData(TagDataHandler));
        dispatcher.register(NotificationHandler::CommandAck(CommandAckHandler));
        dispatcher
    }

    /// Append a handler; it is tried after all earlier ones.
    pub fn register(&mut self, handler: NotificationHandler) {
        self.handlers.push(handler);
    }

    /// Hand the packet to the first accepting handler.
    ///
    /// Returns the handler's name, or `None` on a miss.
    pub fn dispatch(&mut self, packet: &Packet, ctx: &mut Context<'_>) -> Option<&'static str> {
        let handler = self
            .handlers
            .iter_mut()
            .find(|h| h.as_handler().can_handle(packet, &*ctx));

        match handler {
            Some(h) => {
                let h = h.as_handler_mut();
                h.handle(packet, ctx);
                Some(h.name())
            }
            None => {
                self.misses += 1;
                tracing::debug!(
                    event = packet.event.name,
                    mode = ?ctx.mode(),
                    "No handler accepted packet"
                );
                None
            }
        }
    }

    /// Periodic maintenance; evicts stale error rate-limit entries.
    pub fn sweep(&mut self, now: Instant) -> usize {
        self.handlers
            .iter_mut()
            .map(|h| match h {
                NotificationHandler::Error(e) => e.sweep(now),
                _ => 0,
            })
            .sum()
    }

    /// The built-in error handler, if registered.
    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.handlers.iter().find_map(|h| match h {
            NotificationHandler::Error(e) => Some(e),
            _ => None,
        })
    }

    /// Packets no handler accepted.
    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Handler names in dispatch order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.as_handler().name()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
