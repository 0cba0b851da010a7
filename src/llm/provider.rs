//! Provider-agnostic LLM types and the `LlmProvider` trait.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::LlmError;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat conversation.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A tool the model may invoke during a streamed exchange.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool input.
    pub input_schema: Value,
}

/// Request for a single non-streaming completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 1024,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response to a non-streaming completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Request for a streamed chat exchange, optionally with tools.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

impl StreamRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            max_tokens: 2048,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// One item of a streamed chat exchange.
///
/// Tool calls are emitted once their input JSON is fully accumulated. After
/// `Done` or `Error` the stream yields nothing further.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Partial assistant text.
    Text(String),
    /// A complete tool invocation requested by the model.
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    /// The exchange finished normally.
    Done { stop_reason: Option<String> },
    /// The upstream provider failed mid-exchange.
    Error(String),
}

/// An opaque LLM backend: one-shot completions plus streamed chat.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The model identifier requests are issued against.
    fn model_name(&self) -> &str;

    /// Run a single non-streaming completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Open a streamed chat exchange, yielding chunks as they arrive.
    async fn stream_chat(
        &self,
        request: StreamRequest,
    ) -> Result<BoxStream<'static, StreamChunk>, LlmError>;
}
