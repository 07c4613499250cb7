use crate::envelope::ProviderReply;
use serde::{Deserialize, Serialize};

/// Normalised events of a streaming provider call.
///
/// A well-formed stream is any number of `Chunk`s followed by exactly one
/// `Complete` or `Error`. Nothing is emitted after the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial output.
    Chunk { text: String },

    /// Final envelope.
    Complete { reply: ProviderReply },

    /// The provider reported an error mid-stream.
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk { .. })
    }
}

/// A raw server-sent event: optional `event:` name and joined `data:` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Map a provider frame onto a [`StreamEvent`]. Unknown event names yield `None`.
    ///
    /// Frames without an `event:` line are treated as chunks.
    pub fn into_event(self) -> Option<StreamEvent> {
        match self.event.as_deref().unwrap_or("chunk") {
            "chunk" => {
                let text = serde_json::from_str::<serde_json::Value>(&self.data)
                    .ok()
                    .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_string))
                    .unwrap_or(self.data);
                Some(StreamEvent::Chunk { text })
            }
            "complete" => match serde_json::from_str::<ProviderReply>(&self.data) {
                Ok(reply) => Some(StreamEvent::Complete { reply }),
                Err(e) => Some(StreamEvent::Error {
                    message: format!("malformed complete event: {e}"),
                }),
            },
            "error" => {
                let message = serde_json::from_str::<serde_json::Value>(&self.data)
                    .ok()
                    .and_then(|v| {
                        v.get("message")
                            .and_then(|m| m.as_str())
                            .map(str::to_string)
                    })
                    .unwrap_or(self.data);
                Some(StreamEvent::Error { message })
            }
            _ => None,
        }
    }
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes may arrive split anywhere, including inside a multi-byte character;
/// lines are only decoded once their newline has arrived. Frames are emitted
/// once their blank terminator line has been seen.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current: SseFrame,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end])
                .trim_end_matches('\r')
                .to_string();

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            match field {
                "event" => self.current.event = Some(value.to_string()),
                "data" => {
                    if self.has_data {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                    self.has_data = true;
                }
                _ => {}
            }
        }

        frames
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let mut rest = std::mem::take(&mut self.buffer);
            rest.push(b'\n');
            let mut frames = self.push(&rest);
            if let Some(frame) = frames.pop() {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if !self.has_data && self.current.event.is_none() {
            return None;
        }
        self.has_data = false;
        Some(std::mem::take(&mut self.current))
    }
}
