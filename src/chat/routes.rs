//! Chat endpoints — the SSE stream and the conversation history.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures::StreamExt;
use serde::Deserialize;

use crate::auth::Principal;
use crate::chat::service::ChatService;
use crate::onboarding::engine::ProgressionEngine;
use crate::onboarding::routes::onboarding_error_response;

/// Shared state for chat routes.
#[derive(Clone)]
pub struct ChatRouteState {
    pub service: Arc<ChatService>,
    pub engine: Arc<ProgressionEngine>,
    pub history_limit: usize,
}

/// Build the chat routes.
pub fn chat_routes(state: ChatRouteState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/history", get(history))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    /// Onboarding state the client is working on; absent for free-form.
    #[serde(default)]
    state: Option<u8>,
}

/// POST /api/chat
///
/// Streams `chunk` events followed by exactly one `done` or `error`
/// terminal, then closes.
async fn chat(
    State(state): State<ChatRouteState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let stream = state
        .service
        .open_stream(&principal.user_id, body.message, body.state)
        .await;
    Sse::new(stream.map(|event| Ok::<_, Infallible>(event.into_sse())))
        .keep_alive(KeepAlive::default())
}

/// GET /api/chat/history
///
/// The user's conversation log in chronological order.
async fn history(
    State(state): State<ChatRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state
        .engine
        .conversation(&principal.user_id, state.history_limit)
        .await
    {
        Ok(turns) => Json(turns).into_response(),
        Err(e) => onboarding_error_response(e),
    }
}
