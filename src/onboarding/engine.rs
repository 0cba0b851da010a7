//! Progression engine — enforces the 9-state machine.
//!
//! All mutation of a user's onboarding state flows through here. Concurrent
//! `submit_step` calls for the same user are serialized through a per-user
//! async lock so the merge-then-advance sequence cannot interleave and drop
//! a concurrent submission.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::OnboardingError;
use crate::onboarding::state::{
    ConversationTurn, LAST_STATE, OnboardingState, TOTAL_STATES, TurnRole, domain_key,
    state_title,
};
use crate::onboarding::validator::validate_step;
use crate::store::Database;

/// Per-user lock registry. Locks are created on first use and shared by
/// every in-flight operation for that user.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Outcome of a successful step submission.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub current_state: u8,
    pub is_complete: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_state: Option<NextStateInfo>,
}

/// Pointer to the state the user should work on next.
#[derive(Debug, Clone, Serialize)]
pub struct NextStateInfo {
    pub state: u8,
    pub title: String,
    pub domain_key: String,
}

impl NextStateInfo {
    fn for_state(state: u8) -> Option<Self> {
        Some(Self {
            state,
            title: state_title(state)?.to_string(),
            domain_key: domain_key(state)?.to_string(),
        })
    }
}

/// Snapshot of a user's progress for the progress endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub current_state: u8,
    pub completed_states: Vec<u8>,
    pub completion_percentage: u8,
    pub is_complete: bool,
    pub can_complete: bool,
}

/// Orchestrates validator + store under the state-machine rules.
pub struct ProgressionEngine {
    db: Arc<dyn Database>,
    locks: UserLocks,
}

impl ProgressionEngine {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            locks: UserLocks::default(),
        }
    }

    /// Create the user's onboarding state if it does not exist yet.
    ///
    /// Idempotent: an existing state is returned unchanged.
    pub async fn start(&self, user_id: &str) -> Result<OnboardingState, OnboardingError> {
        let _guard = self.locks.acquire(user_id).await;
        if let Some(existing) = self.db.get_onboarding_state(user_id).await? {
            return Ok(existing);
        }
        let state = OnboardingState::new(user_id);
        self.db.create_onboarding_state(&state).await?;
        tracing::info!(user_id, "Onboarding started");
        Ok(state)
    }

    /// Load the user's state, failing with `NotFound` if absent.
    pub async fn get_state(&self, user_id: &str) -> Result<OnboardingState, OnboardingError> {
        self.db
            .get_onboarding_state(user_id)
            .await?
            .ok_or_else(|| OnboardingError::NotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Validate and persist one state's data, then advance the pointer.
    ///
    /// Forward-only: `claimed_state` must equal the user's current state.
    /// Resubmission of the current state replaces its context entry and
    /// records the state in `completed_states` at most once. The merged
    /// context, updated set, and advanced pointer are persisted as one
    /// atomic unit; nothing is written on validation failure.
    pub async fn submit_step(
        &self,
        user_id: &str,
        claimed_state: u8,
        payload: &Value,
    ) -> Result<StepOutcome, OnboardingError> {
        let _guard = self.locks.acquire(user_id).await;

        let mut state = self
            .db
            .get_onboarding_state(user_id)
            .await?
            .ok_or_else(|| OnboardingError::NotFound {
                user_id: user_id.to_string(),
            })?;

        // Completed onboarding is immutable through this engine.
        if state.is_complete || claimed_state != state.current_state {
            return Err(OnboardingError::StateMismatch {
                claimed: claimed_state,
                current: state.current_state,
            });
        }

        let normalized = validate_step(claimed_state, payload).map_err(|errors| {
            OnboardingError::Validation {
                state: claimed_state,
                errors,
            }
        })?;

        let key = domain_key(claimed_state)
            .ok_or(OnboardingError::InvalidState(claimed_state))?;
        state
            .context
            .insert(key.to_string(), Value::Object(normalized));
        state.completed_states.insert(claimed_state);
        if claimed_state == LAST_STATE {
            state.is_complete = true;
        } else {
            state.current_state = claimed_state + 1;
        }
        state.updated_at = chrono::Utc::now();

        self.db.save_onboarding_state(&state).await?;
        tracing::info!(
            user_id,
            state = claimed_state,
            complete = state.is_complete,
            "Onboarding step saved"
        );

        Ok(Self::outcome(&state, claimed_state))
    }

    /// Fails with `Incomplete` unless all states are done; returns the
    /// accumulated context for the profile materializer.
    pub async fn complete(
        &self,
        user_id: &str,
    ) -> Result<serde_json::Map<String, Value>, OnboardingError> {
        let state = self.get_state(user_id).await?;
        if !state.is_complete {
            return Err(OnboardingError::Incomplete {
                completed: state.completed_states.len(),
                total: TOTAL_STATES,
            });
        }
        Ok(state.context)
    }

    /// Progress summary for the progress endpoint.
    pub async fn progress(&self, user_id: &str) -> Result<Progress, OnboardingError> {
        let state = self.get_state(user_id).await?;
        Ok(Progress {
            current_state: state.current_state,
            completed_states: state.completed_states.iter().copied().collect(),
            completion_percentage: state.completion_percentage(),
            is_complete: state.is_complete,
            can_complete: state.can_complete(),
        })
    }

    /// Append a turn to the user's conversation log.
    pub async fn record_turn(
        &self,
        user_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<(), OnboardingError> {
        let state = self.get_state(user_id).await?;
        let turn = ConversationTurn::new(role, content, state.current_state);
        self.db.append_conversation_turn(user_id, &turn).await?;
        Ok(())
    }

    /// Chronological conversation log, up to `limit` turns.
    pub async fn conversation(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, OnboardingError> {
        Ok(self.db.list_conversation_turns(user_id, limit).await?)
    }

    fn outcome(state: &OnboardingState, submitted: u8) -> StepOutcome {
        let (message, next_state) = if state.is_complete {
            (
                "All onboarding steps are complete. Call complete to build your profile."
                    .to_string(),
                None,
            )
        } else {
            let next = NextStateInfo::for_state(state.current_state);
            let title = next
                .as_ref()
                .map(|n| n.title.clone())
                .unwrap_or_default();
            (
                format!(
                    "{} saved. Next up: {}.",
                    state_title(submitted).unwrap_or("Step"),
                    title
                ),
                next,
            )
        };
        StepOutcome {
            current_state: state.current_state,
            is_complete: state.is_complete,
            message,
            next_state,
        }
    }
}
