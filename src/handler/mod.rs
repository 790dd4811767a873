//! Notification dispatch and system handlers.
//!
//! Provides:
//! - [`Dispatcher`] - routes each packet to the first handler that accepts it
//! - [`Context`] - state snapshot, shared metadata and event outbox for a handler
//! - the built-in handlers behind [`NotificationHandler`]
//!
//! # Example
//!
//! ```
//! use cs108_reader::handler::{Dispatcher, RateLimitConfig};
//!
//! let dispatcher = Dispatcher::with_system_handlers(RateLimitConfig::default());
//! assert_eq!(
//!     dispatcher.handler_names(),
//!     [
//!         "battery",
//!         "trigger_pressed",
//!         "trigger_released",
//!         "trigger_state",
//!         "device_error",
//!         "barcode_data",
//!         "tag_data",
//!         "command_ack",
//!     ]
//! );
//! ```

mod battery;
mod context;
mod data;
mod device_error;
mod registry;
mod trigger;

pub use battery::BatteryHandler;
pub use context::{Context, Metadata};
pub use data::{BarcodeHandler, CommandAckHandler, TagDataHandler};
pub use device_error::{
    severity, ErrorDiagnostics, ErrorHandler, RateLimitConfig, RateLimiter, Verdict,
};
pub use registry::{Dispatcher, NotificationHandler};
pub use trigger::{TriggerEdgeHandler, TriggerStateHandler};

use crate::protocol::Packet;

/// A notification handler.
///
/// `can_handle` must not have side effects; `handle` is only called after
/// `can_handle` returned `true` for the same packet and context.
pub trait Handler {
    /// Stable name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Check whether this handler accepts the packet.
    fn can_handle(&self, packet: &Packet, ctx: &Context<'_>) -> bool;

    /// Process the packet, emitting events through `ctx`.
    fn handle(&mut self, packet: &Packet, ctx: &mut Context<'_>);
}
