//! Agent router — maps a chat request to the capability that handles it.
//!
//! During onboarding the fixed state table decides; explicit state claims
//! select that state's capability and free-form queries are classified.
//! After completion everything routes to `general`, and asking for an
//! onboarding capability is an authorization error.

use std::sync::Arc;

use crate::agent::capability::Capability;
use crate::agent::prompts::classification_prompt;
use crate::error::AuthError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::onboarding::state::OnboardingState;

pub struct AgentRouter {
    llm: Arc<dyn LlmProvider>,
}

impl AgentRouter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Pick the capability for a chat request.
    ///
    /// `state_claim` is the onboarding state the client says it is working
    /// on; `None` marks a free-form query.
    pub async fn route(
        &self,
        onboarding: &OnboardingState,
        state_claim: Option<u8>,
        message: &str,
    ) -> Result<Capability, AuthError> {
        if onboarding.is_complete {
            return match state_claim.and_then(Capability::for_state) {
                Some(capability) => Err(AuthError::CapabilityNotAllowed {
                    capability: capability.to_string(),
                }),
                None => Ok(Capability::General),
            };
        }

        match state_claim {
            Some(state) => Capability::for_state(state).ok_or(AuthError::CapabilityNotAllowed {
                capability: format!("state {state}"),
            }),
            None => Ok(self.classify(message).await),
        }
    }

    /// Classify a free-form query into a capability tag.
    ///
    /// Any provider failure or unparseable answer falls back to `general`
    /// rather than failing the request.
    pub async fn classify(&self, message: &str) -> Capability {
        let request = CompletionRequest::new(vec![ChatMessage::user(classification_prompt(
            message,
        ))])
        .with_max_tokens(8)
        .with_temperature(0.0);

        match self.llm.complete(request).await {
            Ok(response) => response.content.parse().unwrap_or_else(|_| {
                tracing::debug!(tag = %response.content.trim(), "Unparseable classification tag");
                Capability::General
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Classification call failed, using general");
                Capability::General
            }
        }
    }
}
