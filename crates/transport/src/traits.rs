//! Transport Traits
//!
//! Abstract interfaces for transport implementations.

use voice_journal_core::OutboundEvent;

use crate::TransportError;

/// Physical writer behind a transport (SSE body channel, socket writer, ...)
///
/// Implementations must make `write` after `shutdown` fail with
/// [`TransportError::Closed`] rather than reach the peer.
pub trait EventSink: Send + Sync {
    /// Write one event to the peer
    fn write(&self, event: &OutboundEvent) -> Result<(), TransportError>;

    /// Physically close the channel
    fn shutdown(&self);
}

/// Close-safe sending half used by the turn pipeline
pub trait EventSender: Send + Sync {
    /// Send an event; returns whether it was written. Never panics or errors
    /// after close.
    fn send(&self, event: OutboundEvent) -> bool;

    /// Close; returns `true` only for the first caller
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;
}
