//! Stream event protocol.
//!
//! A chat exchange is zero or more `chunk` events followed by exactly one
//! terminal event, either `done` or `error`. Nothing is emitted after the
//! terminal event.

use axum::response::sse;
use serde::{Deserialize, Serialize};

/// One event on a chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    /// Opaque partial text of the agent's reply.
    Chunk { text: String },
    /// Terminal: the exchange finished, tagged with the capability that
    /// produced the response.
    Done { agent_type: String },
    /// Terminal: the exchange failed with a human-readable message.
    Error { message: String },
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { text: text.into() }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    /// The SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }

    /// The JSON payload carried in the SSE data field.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::Chunk { text } => serde_json::json!({"text": text}),
            Self::Done { agent_type } => serde_json::json!({"agent_type": agent_type}),
            Self::Error { message } => serde_json::json!({"message": message}),
        }
    }

    /// Render as an SSE wire event.
    pub fn into_sse(self) -> sse::Event {
        sse::Event::default()
            .event(self.name())
            .data(self.payload().to_string())
    }
}
