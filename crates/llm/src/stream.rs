//! Line framing for `text/event-stream` response bodies.

/// Splits a byte stream into `data:` payloads
///
/// Partial lines (and partial UTF-8 sequences) are carried over to the next
/// push. Comment lines, `event:` lines and blank lines are skipped.
#[derive(Debug, Default)]
pub struct DataLineDecoder {
    buffer: Vec<u8>,
}

impl DataLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}
