//! Realtime publication surface
//!
//! Inbox and broadcast activity fans out to connected operator sockets
//! through a process-wide [`hub::RealtimeHub`]. Components receive an
//! injected [`RealtimePublisher`] rather than reaching for a global, so
//! tests can capture events and alternative transports can be swapped in.

pub mod events;
pub mod hub;

pub use events::{RealtimeEvent, Room};
pub use hub::RealtimeHub;

/// Anything that can publish realtime events to a room.
pub trait RealtimePublisher: Send + Sync {
    fn publish(&self, room: Room, event: RealtimeEvent);
}

/// Publisher that drops everything; used where realtime is not wired up.
pub struct NullPublisher;

impl RealtimePublisher for NullPublisher {
    fn publish(&self, _room: Room, _event: RealtimeEvent) {}
}
