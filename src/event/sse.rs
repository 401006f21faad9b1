// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Incremental parser for server-sent-event framing.
//!
//! The bridge puts everything of interest into the `data` field, so the
//! parser only accumulates `data` lines and emits the joined payload at
//! each blank-line event boundary. `id`, `event` and `retry` fields and
//! comment lines (the bridge's keepalives) are ignored.

/// Parses SSE frames out of an arbitrary byte-chunk sequence.
///
/// Feed it chunks as they arrive; it returns the completed `data`
/// payloads. Partial lines and partial events are buffered across calls.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    data: String,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk, returning the `data` payloads of every event
    /// completed by it.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if let Some(payload) = self.process_line(line) {
                payloads.push(payload);
            }
        }

        payloads
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            // Event boundary.
            if self.data.is_empty() {
                return None;
            }
            let mut payload = std::mem::take(&mut self.data);
            payload.pop(); // trailing joiner
            return Some(payload);
        }

        if line.starts_with(':') {
            // Comment, used by the bridge as keepalive.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data.push_str(value);
            self.data.push('\n');
        }

        None
    }
}
