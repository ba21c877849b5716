//! Line-oriented SSE buffering shared by the streaming providers.
//!
//! Bytes are buffered until a full line is available, so a multi-byte UTF-8
//! character split across network chunks is decoded intact.

/// One meaningful line of an SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// `event: <name>`
    Event(String),
    /// `data: <payload>`
    Data(String),
}

/// Incremental splitter for SSE byte streams.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and drain every complete line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = parse_line(&raw[..raw.len() - 1]) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseLine> {
        let raw = std::mem::take(&mut self.pending);
        parse_line(&raw)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseLine> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches('\r');

    // Skip empty lines and SSE comments
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    if let Some(data) = line.strip_prefix("data:") {
        return Some(SseLine::Data(data.trim().to_string()));
    }
    if let Some(event) = line.strip_prefix("event:") {
        return Some(SseLine::Event(event.trim().to_string()));
    }
    None
}
