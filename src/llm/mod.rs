//! LLM integration.
//!
//! The [`LlmProvider`] trait is the narrow interface the rest of the service
//! consumes: a one-shot `complete` for classification and a `stream_chat`
//! yielding text chunks and tool calls. The Anthropic Messages API is the
//! production backend; tests use stub providers.

pub mod anthropic;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, StreamChunk,
    StreamRequest, ToolDefinition,
};
