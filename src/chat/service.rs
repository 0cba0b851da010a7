//! Streaming chat transport.
//!
//! One logical stream per request: zero or more `chunk` events, then exactly
//! one terminal (`done` or `error`), after which the stream closes. The
//! transport drives the routed agent's token stream, executes mid-stream
//! save calls through the progression engine, and enforces the idle window
//! and the one-active-stream-per-user rule.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::capability::Capability;
use crate::agent::prompts::{SAVE_TOOL_NAME, save_tool, system_prompt};
use crate::agent::router::AgentRouter;
use crate::chat::events::StreamEvent;
use crate::chat::session::StreamRegistry;
use crate::error::StreamError;
use crate::llm::{ChatMessage, LlmProvider, StreamChunk, StreamRequest};
use crate::onboarding::engine::ProgressionEngine;
use crate::onboarding::state::TurnRole;

/// Conversation turns included as prompt context.
const PROMPT_HISTORY_TURNS: usize = 20;

pub struct ChatService {
    llm: Arc<dyn LlmProvider>,
    engine: Arc<ProgressionEngine>,
    router: AgentRouter,
    registry: StreamRegistry,
    idle_timeout: Duration,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        engine: Arc<ProgressionEngine>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            router: AgentRouter::new(Arc::clone(&llm)),
            llm,
            engine,
            registry: StreamRegistry::new(),
            idle_timeout,
        }
    }

    /// Open a stream for one chat exchange.
    ///
    /// Claims the user's stream slot immediately (superseding any prior
    /// stream) and spawns the exchange; the returned stream yields events
    /// until its single terminal.
    pub async fn open_stream(
        self: Arc<Self>,
        user_id: &str,
        message: String,
        state_claim: Option<u8>,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        let handle = self.registry.begin(user_id).await;
        let service = self;
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let terminal = tokio::select! {
                _ = handle.cancelled() => StreamEvent::error(StreamError::Superseded),
                terminal = service.run_exchange(&user_id, &message, state_claim, &tx) => terminal,
            };
            // The single terminal event; the receiver closes after it.
            let _ = tx.send(terminal).await;
            service.registry.finish(&handle).await;
        });

        ReceiverStream::new(rx)
    }

    /// Drive one exchange to its terminal event.
    ///
    /// Every return path maps to exactly one terminal; chunks are emitted
    /// along the way.
    async fn run_exchange(
        &self,
        user_id: &str,
        message: &str,
        state_claim: Option<u8>,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> StreamEvent {
        let onboarding = match self.engine.get_state(user_id).await {
            Ok(state) => state,
            Err(e) => return StreamEvent::error(e),
        };

        let capability = match self.router.route(&onboarding, state_claim, message).await {
            Ok(capability) => capability,
            Err(e) => return StreamEvent::error(e),
        };

        if let Err(e) = self.engine.record_turn(user_id, TurnRole::User, message).await {
            tracing::warn!(user_id, error = %e, "Failed to record user turn");
        }

        let request = self.build_request(&onboarding, capability, message, user_id).await;
        let mut upstream = match self.llm.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => return StreamEvent::error(StreamError::Upstream(e.to_string())),
        };

        let mut full_text = String::new();
        loop {
            let chunk = match timeout(self.idle_timeout, upstream.next()).await {
                Err(_) => {
                    return StreamEvent::error(StreamError::IdleTimeout {
                        seconds: self.idle_timeout.as_secs(),
                    });
                }
                // Upstream closed without an explicit done marker.
                Ok(None) => break,
                Ok(Some(chunk)) => chunk,
            };

            match chunk {
                StreamChunk::Text(text) => {
                    full_text.push_str(&text);
                    if tx.send(StreamEvent::chunk(text)).await.is_err() {
                        // Client went away; the terminal send will be a no-op.
                        return StreamEvent::error(StreamError::Upstream(
                            "client disconnected".to_string(),
                        ));
                    }
                }
                StreamChunk::ToolCall { name, input, .. } if name == SAVE_TOOL_NAME => {
                    match self.handle_save(user_id, &input).await {
                        Ok(confirmation) => {
                            full_text.push_str(&confirmation);
                            if tx.send(StreamEvent::chunk(confirmation)).await.is_err() {
                                return StreamEvent::error(StreamError::Upstream(
                                    "client disconnected".to_string(),
                                ));
                            }
                        }
                        Err(event) => return event,
                    }
                }
                StreamChunk::ToolCall { name, .. } => {
                    return StreamEvent::error(StreamError::MalformedPayload(format!(
                        "unknown tool: {name}"
                    )));
                }
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => {
                    return StreamEvent::error(StreamError::Upstream(e));
                }
            }
        }

        if !full_text.is_empty()
            && let Err(e) = self
                .engine
                .record_turn(user_id, TurnRole::Assistant, &full_text)
                .await
        {
            tracing::warn!(user_id, error = %e, "Failed to record assistant turn");
        }

        StreamEvent::Done {
            agent_type: capability.to_string(),
        }
    }

    /// Execute a mid-stream save call through the progression engine.
    ///
    /// A failed save ends the stream in an error terminal; the engine's
    /// atomicity guarantees that nothing partial was written.
    async fn handle_save(&self, user_id: &str, input: &Value) -> Result<String, StreamEvent> {
        let state = input
            .get("state")
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok());
        let data = input.get("data");
        let (Some(state), Some(data)) = (state, data) else {
            return Err(StreamEvent::error(StreamError::MalformedPayload(
                "save_step_data requires integer `state` and object `data`".to_string(),
            )));
        };

        match self.engine.submit_step(user_id, state, data).await {
            Ok(outcome) => Ok(format!("\n\n{}", outcome.message)),
            Err(e) => Err(StreamEvent::error(e)),
        }
    }

    async fn build_request(
        &self,
        onboarding: &crate::onboarding::state::OnboardingState,
        capability: Capability,
        message: &str,
        user_id: &str,
    ) -> StreamRequest {
        let mut messages = vec![ChatMessage::system(system_prompt(capability, onboarding))];

        match self.engine.conversation(user_id, PROMPT_HISTORY_TURNS).await {
            Ok(turns) => {
                for turn in turns {
                    messages.push(match turn.role {
                        TurnRole::User => ChatMessage::user(turn.content),
                        TurnRole::Assistant => ChatMessage::assistant(turn.content),
                    });
                }
            }
            Err(e) => tracing::warn!(user_id, error = %e, "Failed to load history for prompt"),
        }
        messages.push(ChatMessage::user(message));

        let tools = if capability.is_onboarding() {
            vec![save_tool()]
        } else {
            Vec::new()
        };
        StreamRequest::new(messages).with_tools(tools)
    }
}
