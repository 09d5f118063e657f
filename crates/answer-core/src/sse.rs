//! Server-sent event line handling.
//!
//! Network chunks do not line up with SSE records, so bytes are buffered
//! until a full line is available. Buffering happens on bytes rather than
//! text so a multi-byte character split across chunks survives intact.

use crate::error::{AnswerError, Result};
use crate::types::StreamEvent;

/// Longest unterminated line held before the stream is failed.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            max_line: MAX_LINE_BYTES,
        }
    }
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the unterminated line cap.
    #[must_use]
    pub const fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Append a chunk and drain every complete line it finishes.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped.
    ///
    /// # Errors
    ///
    /// Returns [`AnswerError::Stream`] once the unterminated tail grows past
    /// the line cap.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if self.pending.len() > self.max_line {
            self.pending.clear();
            return Err(AnswerError::Stream(format!(
                "event line exceeds {} bytes",
                self.max_line
            )));
        }
        Ok(lines)
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// JSON payload of a `data:` line.
///
/// Returns `None` for blank lines, `[DONE]`, and other SSE fields
/// (`event:`, `id:`, comments).
#[must_use]
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload)
}

/// Parse one SSE line into a provider event.
///
/// Malformed JSON is logged and skipped.
#[must_use]
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let data = data_payload(line)?;
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(data = %data, error = %e, "failed to parse event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_chunks_are_joined() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"type\":").unwrap().is_empty());
        let lines = buffer.push(b"\"ping\"}\n\nevent: x\r\n").unwrap();
        assert_eq!(lines, ["data: {\"type\":\"ping\"}", "", "event: x"]);
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let bytes = "data: é\n".as_bytes();
        let mut buffer = LineBuffer::new();
        // Split inside the two-byte sequence for 'é'.
        assert!(buffer.push(&bytes[..7]).unwrap().is_empty());
        assert_eq!(buffer.push(&bytes[7..]).unwrap(), ["data: é"]);
    }

    #[test]
    fn finish_returns_trailing_partial_line() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"data: [DONE]").unwrap();
        assert_eq!(buffer.finish().as_deref(), Some("data: [DONE]"));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn unterminated_line_over_cap_fails() {
        let mut buffer = LineBuffer::new().with_max_line(16);
        assert_eq!(buffer.push(b"data: ok\n0123456789").unwrap(), ["data: ok"]);
        let err = buffer.push(b"0123456789").unwrap_err();
        assert!(matches!(err, AnswerError::Stream(ref m) if m.contains("16 bytes")));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn long_terminated_lines_within_cap_pass() {
        let mut buffer = LineBuffer::new().with_max_line(16);
        let lines = buffer.push(b"data: 0123456789abcdef\n").unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn data_payload_filters_control_lines() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data: [DONE]"), None);
        assert_eq!(data_payload("event: message_start"), None);
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn parse_line_skips_malformed_json() {
        assert!(parse_line("data: {not json").is_none());
        assert!(matches!(
            parse_line("data: {\"type\":\"message_stop\"}"),
            Some(StreamEvent::MessageStop)
        ));
    }
}
