// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server-Sent Events decoding.
//!
//! Bytes arrive in arbitrary chunks; [`SseLineBuffer`] reassembles lines and
//! [`SseDecoder`] groups `data:` lines into events, emitting an event's
//! payload when the blank line that ends it arrives.

/// Reassembles lines from a chunked byte stream.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Append a chunk and return the complete lines it finished, with line
    /// terminators removed. Blank lines are kept; they delimit events.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    /// Flush whatever is left as a final line.
    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(rel) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + rel;
            let mut end = newline;
            if end > start && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = newline + 1;
        }

        if flush {
            if start < self.buffer.len() {
                lines.push(String::from_utf8_lossy(&self.buffer[start..]).into_owned());
            }
            self.buffer.clear();
        } else if start > 0 {
            self.buffer.drain(..start);
        }

        lines
    }
}

/// Groups SSE lines into event payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: SseLineBuffer,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the payloads of events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let lines = self.lines.push(chunk);
        self.consume(lines)
    }

    /// End of stream: flush a trailing event that lacked its blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let lines = self.lines.finish();
        let mut events = self.consume(lines);
        if let Some(event) = self.take_event() {
            events.push(event);
        }
        events
    }

    fn consume(&mut self, lines: Vec<String>) -> Vec<String> {
        let mut events = Vec::new();
        for line in lines {
            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
            } else if let Some(payload) = sse_data_payload(&line) {
                self.data.push(payload.to_string());
            }
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we use.
        }
        events
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        if payload.trim().is_empty() {
            None
        } else {
            Some(payload)
        }
    }
}

/// Whether a `Content-Type` value denotes an event stream.
pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

/// The value of a `data:` field, with the single optional leading space
/// removed.
pub fn sse_data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
