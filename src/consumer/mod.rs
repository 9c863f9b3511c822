//! Receiving side of the relay exchange: reassembles server-sent event lines
//! from raw bytes and folds incremental deltas into a finished bot turn.

use crate::models::chat::{ Speaker, Speech };
use log::{ error, warn };
use serde::Deserialize;

/// Provider end-of-stream marker inside a `data:` record.
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Lifecycle of one streamed turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    /// Connection requested, no chunk received yet.
    Opening,
    /// Receiving chunks and accumulating text.
    Streaming,
    /// Stream ended normally and the accumulated text was committed.
    Closed,
    /// Terminal failure. Partial accumulation is discarded, never committed.
    Errored,
}

/// Finite-state consumer for one outgoing turn. Chunks are applied strictly
/// in arrival order; there is no concurrent access to the buffer.
pub struct StreamConsumer {
    phase: StreamPhase,
    buffer: String,
    error: Option<String>,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Idle,
            buffer: String::new(),
            error: None,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.phase, StreamPhase::Opening | StreamPhase::Streaming)
    }

    /// Text accumulated so far for the in-progress turn.
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    /// Last user-visible error message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Connection requested: clear any previously displayed partial text.
    pub fn open(&mut self) {
        self.buffer.clear();
        self.error = None;
        self.phase = StreamPhase::Opening;
    }

    /// Apply one inbound `data:` payload. Returns the delta appended, if the
    /// chunk carried one; a chunk without a delta is not an error. A chunk
    /// that fails to parse is logged and surfaced as an error message, but
    /// the stream itself is left running.
    pub fn on_chunk(&mut self, data: &str) -> Option<String> {
        self.phase = StreamPhase::Streaming;
        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Failed to parse stream chunk: {} for data: {}", e, data);
                self.error = Some("Failed to parse the response".to_string());
                return None;
            }
        };

        let mut appended = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.buffer.push_str(&content);
                    appended.push_str(&content);
                }
            }
        }
        if appended.is_empty() {
            None
        } else {
            Some(appended)
        }
    }

    /// Stream ended normally: normalize `<br>` markers to newlines and yield
    /// the finished bot turn for committing into the conversation.
    pub fn on_close(&mut self) -> Speech {
        self.phase = StreamPhase::Closed;
        let text = std::mem::take(&mut self.buffer).replace("<br>", "\n");
        Speech {
            speaker: Speaker::Bot,
            text,
        }
    }

    /// Abandon an in-flight stream without committing anything, returning to
    /// idle. Used after the connection is dropped mid-stream, the only
    /// cancellation path; the partial accumulation is simply lost.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.error = None;
        self.phase = StreamPhase::Idle;
    }

    /// Terminal failure: discard the partial accumulation without committing
    /// it and surface a short user-visible message.
    pub fn on_error(&mut self, detail: &str) {
        error!("Stream failed: {}", detail);
        self.phase = StreamPhase::Errored;
        self.buffer.clear();
        self.error = Some("Something went wrong with the request".to_string());
    }
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reassembles complete lines from raw byte chunks. Upstream chunk boundaries
/// are not guaranteed to align with event boundaries, so partial lines are
/// carried over until their terminator arrives.
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append raw bytes and drain every complete line, without its
    /// terminator. Bytes after the last newline stay buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut line = &raw[..raw.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the payload of a `data:` event line, if this line is one.
pub fn sse_data(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}
