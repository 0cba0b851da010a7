//! Onboarding state model — the 9 ordered data-collection states.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// First onboarding state.
pub const FIRST_STATE: u8 = 1;
/// Last onboarding state. Completion is a flag, not a 10th state.
pub const LAST_STATE: u8 = 9;
/// Total number of onboarding states.
pub const TOTAL_STATES: usize = 9;

/// Domain key under which a state's validated payload is stored in the
/// accumulated context. One key per state.
pub fn domain_key(state: u8) -> Option<&'static str> {
    match state {
        1 => Some("fitness_goals"),
        2 => Some("fitness_assessment"),
        3 => Some("workout_constraints"),
        4 => Some("training_schedule"),
        5 => Some("workout_planning"),
        6 => Some("nutrition_habits"),
        7 => Some("nutrition_targets"),
        8 => Some("lifestyle"),
        9 => Some("body_metrics"),
        _ => None,
    }
}

/// Human-readable title for a state, used in step responses and prompts.
pub fn state_title(state: u8) -> Option<&'static str> {
    match state {
        1 => Some("Fitness goals"),
        2 => Some("Fitness assessment"),
        3 => Some("Workout constraints"),
        4 => Some("Training schedule"),
        5 => Some("Workout planning"),
        6 => Some("Nutrition habits"),
        7 => Some("Nutrition targets"),
        8 => Some("Lifestyle"),
        9 => Some("Body metrics"),
        _ => None,
    }
}

/// Per-user onboarding progression state (1:1 with the user).
///
/// Mutated only by the progression engine, under a per-user serialization
/// guarantee. `completed_states` grows monotonically; once `is_complete` is
/// set, `current_state` and `completed_states` never change again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingState {
    pub user_id: String,
    /// Current state number, always within 1..=9.
    pub current_state: u8,
    /// States completed so far, each recorded exactly once.
    pub completed_states: BTreeSet<u8>,
    /// Validated payloads keyed by domain key (see [`domain_key`]).
    pub context: serde_json::Map<String, serde_json::Value>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingState {
    /// Fresh state for a newly registered user.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            current_state: FIRST_STATE,
            completed_states: BTreeSet::new(),
            context: serde_json::Map::new(),
            is_complete: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// `round(len(completed_states) / 9 * 100)`.
    pub fn completion_percentage(&self) -> u8 {
        let fraction = self.completed_states.len() as f64 / TOTAL_STATES as f64;
        (fraction * 100.0).round() as u8
    }

    /// Whether `complete()` may be called.
    pub fn can_complete(&self) -> bool {
        self.is_complete
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

/// One entry in the append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: TurnRole,
    pub content: String,
    /// The user's current state when the turn was recorded.
    pub state_at: u8,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>, state_at: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            state_at,
            created_at: Utc::now(),
        }
    }
}
