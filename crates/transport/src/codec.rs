//! Wire framing
//!
//! SSE: `event: <kind>` then `data: <payload json>` then a blank line.
//! WebSocket: the whole event as one JSON text message tagged with `type`.

use voice_journal_core::OutboundEvent;

use crate::TransportError;

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: &'static str,
    pub data: String,
}

impl SseFrame {
    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

pub fn encode_sse(event: &OutboundEvent) -> Result<SseFrame, TransportError> {
    let payload = event
        .payload()
        .map_err(|e| TransportError::Encode(e.to_string()))?;
    Ok(SseFrame {
        event: event.kind().as_str(),
        data: payload.to_string(),
    })
}

pub fn encode_json(event: &OutboundEvent) -> Result<String, TransportError> {
    serde_json::to_string(event).map_err(|e| TransportError::Encode(e.to_string()))
}
