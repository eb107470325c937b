//! Outbound wire events
//!
//! The event catalogue shared by the server transport and the client reader.
//! On a WebSocket every event is one JSON object tagged with `type`; on SSE
//! the tag becomes the `event:` line and the remaining fields the `data:` line.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::TurnId;

/// One sentence queued for synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceJob {
    index: usize,
    text: String,
}

impl SentenceJob {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Position within the turn, the correlation key between text and audio
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Event kinds of the turn protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Text,
    Audio,
    Done,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Text => "text",
            EventKind::Audio => "audio",
            EventKind::Done => "done",
            EventKind::Error => "error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "started" => Some(EventKind::Started),
            "text" => Some(EventKind::Text),
            "audio" => Some(EventKind::Audio),
            "done" => Some(EventKind::Done),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }
}

/// Server-to-client event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// The user turn was persisted and the model call is starting
    #[serde(rename_all = "camelCase")]
    Started { user_turn_id: TurnId },

    /// One model token, forwarded as soon as it arrives
    Text { token: String },

    /// One audio sub-chunk for one sentence
    #[serde(rename_all = "camelCase")]
    Audio {
        sentence_index: usize,
        audio_bytes_or_url: String,
        content_type: String,
        text: String,
    },

    /// All synthesis settled and the AI turn was persisted
    #[serde(rename_all = "camelCase")]
    Done {
        full_text: String,
        total_sentences: usize,
        ai_turn_id: TurnId,
        latency_ms: u64,
    },

    /// Turn-level failure, or a per-sentence failure when `sentence_index` is set
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sentence_index: Option<usize>,
    },
}

impl OutboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OutboundEvent::Started { .. } => EventKind::Started,
            OutboundEvent::Text { .. } => EventKind::Text,
            OutboundEvent::Audio { .. } => EventKind::Audio,
            OutboundEvent::Done { .. } => EventKind::Done,
            OutboundEvent::Error { .. } => EventKind::Error,
        }
    }

    pub fn text(token: impl Into<String>) -> Self {
        OutboundEvent::Text {
            token: token.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            message: message.into(),
            sentence_index: None,
        }
    }

    pub fn sentence_error(sentence_index: usize, message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            message: message.into(),
            sentence_index: Some(sentence_index),
        }
    }

    /// Ends the turn from the client's point of view
    pub fn is_terminal(&self) -> bool {
        match self {
            OutboundEvent::Done { .. } => true,
            OutboundEvent::Error { sentence_index, .. } => sentence_index.is_none(),
            _ => false,
        }
    }

    /// Payload fields without the `type` tag
    pub fn payload(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("type");
        }
        Ok(value)
    }

    /// Rebuild an event from a kind name and its payload JSON
    pub fn from_parts(kind: &str, payload: &str) -> serde_json::Result<Self> {
        let mut value: Value = serde_json::from_str(payload)?;
        match &mut value {
            Value::Object(map) => {
                map.insert("type".to_string(), Value::String(kind.to_string()));
            }
            _ => {
                return Err(serde::de::Error::custom("event payload must be a JSON object"));
            }
        }
        serde_json::from_value(value)
    }
}

/// Audio returned by a speech provider: inline bytes or a URL to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioData {
    Inline(Bytes),
    Url(String),
}

impl AudioData {
    /// Wire form used by `audioBytesOrUrl`: base64 for inline bytes
    pub fn to_wire(&self) -> String {
        match self {
            AudioData::Inline(bytes) => BASE64.encode(bytes),
            AudioData::Url(url) => url.clone(),
        }
    }

    /// Inverse of [`AudioData::to_wire`]
    pub fn from_wire(value: &str) -> Result<Self, base64::DecodeError> {
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(AudioData::Url(value.to_string()));
        }
        BASE64.decode(value).map(|b| AudioData::Inline(Bytes::from(b)))
    }

    pub fn len(&self) -> usize {
        match self {
            AudioData::Inline(bytes) => bytes.len(),
            AudioData::Url(url) => url.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_event_wire_shape() {
        let event = OutboundEvent::Audio {
            sentence_index: 2,
            audio_bytes_or_url: "AAAA".to_string(),
            content_type: "audio/wav".to_string(),
            text: "Hi.".to_string(),
        };
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["sentenceIndex"], 2);
        assert_eq!(json["audioBytesOrUrl"], "AAAA");
        assert_eq!(json["contentType"], "audio/wav");
    }

    #[test]
    fn test_turn_error_omits_index() {
        let json = serde_json::to_string(&OutboundEvent::error("boom")).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"boom"}"#);
    }

    #[test]
    fn test_payload_and_from_parts() {
        let event = OutboundEvent::Done {
            full_text: "Hi there.".to_string(),
            total_sentences: 1,
            ai_turn_id: TurnId::new("t-2"),
            latency_ms: 42,
        };
        let payload = event.payload().unwrap();
        assert!(payload.get("type").is_none());
        assert_eq!(payload["aiTurnId"], "t-2");

        let rebuilt = OutboundEvent::from_parts("done", &payload.to_string()).unwrap();
        assert_eq!(rebuilt, event);
    }

    #[test]
    fn test_from_parts_rejects_non_object() {
        assert!(OutboundEvent::from_parts("text", "\"hello\"").is_err());
        assert!(OutboundEvent::from_parts("nope", "{}").is_err());
    }

    #[test]
    fn test_terminal_events() {
        assert!(OutboundEvent::error("x").is_terminal());
        assert!(!OutboundEvent::sentence_error(1, "x").is_terminal());
        assert!(!OutboundEvent::text("a").is_terminal());
    }

    #[test]
    fn test_audio_data_wire() {
        let inline = AudioData::Inline(Bytes::from_static(b"RIFF"));
        assert_eq!(AudioData::from_wire(&inline.to_wire()).unwrap(), inline);

        let url = AudioData::Url("https://cdn.example.com/a.mp3".to_string());
        assert_eq!(AudioData::from_wire(&url.to_wire()).unwrap(), url);
    }
}
