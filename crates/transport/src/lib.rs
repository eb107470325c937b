//! Voice Journal Transport Layer
//!
//! Owns the single outbound channel of a connection (an SSE response body or
//! a WebSocket) and guarantees that sending after close is a logged no-op.
//!
//! - [`EventTransport`]: connection-level transport, closed exactly once
//! - [`ScopedTransport`]: per-turn view that can be closed without closing
//!   the connection
//! - [`codec`]: SSE and JSON framing of [`OutboundEvent`]s
//!
//! [`OutboundEvent`]: voice_journal_core::OutboundEvent

pub mod channel;
pub mod codec;
pub mod traits;
pub mod transport;

pub use channel::ChannelSink;
pub use codec::{encode_json, encode_sse, SseFrame};
pub use traits::{EventSender, EventSink};
pub use transport::{EventTransport, ScopedTransport};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Encoding failed: {0}")]
    Encode(String),
}
