//! Anthropic Messages API provider.
//!
//! Streaming uses Server-Sent Events; tool-call input JSON arrives as
//! incremental deltas and is accumulated until the content block closes, so
//! consumers only ever see complete tool invocations.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, StreamChunk,
    StreamRequest, ToolDefinition,
};

const API_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicProvider {
    client: Client,
    config: LlmConfig,
}

impl AnthropicProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_builder(&self) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{API_BASE_URL}/messages"))
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
    }

    /// Split messages into the system prompt and the conversation turns the
    /// Messages API expects.
    fn build_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
        temperature: Option<f32>,
        stream: bool,
    ) -> MessagesRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let turns = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: m.content.clone(),
            })
            .collect();

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens,
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            messages: turns,
            tools: tools
                .iter()
                .map(|t| ApiTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
            stream,
            temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(
            &request.messages,
            &[],
            request.max_tokens,
            request.temperature,
            false,
        );

        let response = self.request_builder().json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let content = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }

    async fn stream_chat(
        &self,
        request: StreamRequest,
    ) -> Result<BoxStream<'static, StreamChunk>, LlmError> {
        let body = self.build_body(
            &request.messages,
            &request.tools,
            request.max_tokens,
            None,
            true,
        );

        let response = self.request_builder().json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let (tx, rx) = mpsc::channel::<StreamChunk>(64);
        let mut byte_stream = Box::pin(response.bytes_stream());

        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();

            while let Some(result) = byte_stream.next().await {
                let bytes = match result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamChunk::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    let Some(event) = parse_sse_line(&line) else {
                        continue;
                    };
                    if dispatch_event(event, &tx, &mut tool_calls).await.is_break() {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Forward one parsed SSE event to the consumer. Returns `Break` once a
/// terminal chunk has been sent.
async fn dispatch_event(
    event: SseEvent,
    tx: &mpsc::Sender<StreamChunk>,
    tool_calls: &mut Vec<ToolCallAccumulator>,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    match event {
        SseEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            SseContentBlock::Text { text } => {
                if !text.is_empty() && tx.send(StreamChunk::Text(text)).await.is_err() {
                    return ControlFlow::Break(());
                }
            }
            SseContentBlock::ToolUse { id, name, .. } => {
                while tool_calls.len() <= index {
                    tool_calls.push(ToolCallAccumulator::default());
                }
                tool_calls[index] = ToolCallAccumulator {
                    id,
                    name,
                    input_json: String::new(),
                };
            }
        },
        SseEvent::ContentBlockDelta { index, delta } => match delta {
            SseDelta::TextDelta { text } => {
                if tx.send(StreamChunk::Text(text)).await.is_err() {
                    return ControlFlow::Break(());
                }
            }
            SseDelta::InputJsonDelta { partial_json } => {
                if let Some(acc) = tool_calls.get_mut(index) {
                    acc.input_json.push_str(&partial_json);
                }
            }
        },
        SseEvent::ContentBlockStop { index } => {
            if let Some(acc) = tool_calls.get(index) {
                if !acc.id.is_empty() {
                    let input: Value = serde_json::from_str(&acc.input_json)
                        .unwrap_or(Value::Object(serde_json::Map::new()));
                    let chunk = StreamChunk::ToolCall {
                        id: acc.id.clone(),
                        name: acc.name.clone(),
                        input,
                    };
                    if tx.send(chunk).await.is_err() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
        SseEvent::MessageDelta { delta } => {
            let _ = tx
                .send(StreamChunk::Done {
                    stop_reason: delta.stop_reason,
                })
                .await;
            return ControlFlow::Break(());
        }
        SseEvent::Error { error } => {
            let _ = tx
                .send(StreamChunk::Error(format!(
                    "{}: {}",
                    error.error_type, error.message
                )))
                .await;
            return ControlFlow::Break(());
        }
        SseEvent::MessageStart { .. } | SseEvent::MessageStop | SseEvent::Ping => {}
    }
    ControlFlow::Continue(())
}

/// Parse one `data: {...}` SSE line.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let json = line.strip_prefix("data: ")?;
    if json.is_empty() {
        return None;
    }
    serde_json::from_str(json).ok()
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    MessageStart {
        #[serde(rename = "message")]
        _message: Value,
    },
    ContentBlockStart {
        index: usize,
        content_block: SseContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: SseDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: SseMessageDelta,
    },
    MessageStop,
    Ping,
    Error {
        error: SseError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(rename = "input")]
        _input: Value,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct SseMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
