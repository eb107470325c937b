//! Incremental SSE decoding
//!
//! An `event:` name is held until the next `data:` line, then both are
//! emitted together. Comment lines (`:`) and blank lines are ignored.

/// One decoded event/payload pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending_event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every pair completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(name) = field(line, "event") {
                self.pending_event = Some(name.to_string());
            } else if let Some(data) = field(line, "data") {
                let event = self
                    .pending_event
                    .take()
                    .unwrap_or_else(|| "message".to_string());
                messages.push(SseMessage {
                    event,
                    data: data.to_string(),
                });
            }
        }
        messages
    }
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}
