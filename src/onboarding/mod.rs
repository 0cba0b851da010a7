//! Onboarding system — the 9-state data-collection flow.
//!
//! A new user progresses through 9 ordered states, each collecting one
//! domain of fitness data. The progression engine enforces forward-only
//! transitions and per-user serialization; the validator applies each
//! state's rule table; the accumulated context feeds the profile
//! materializer once every state is complete.

pub mod engine;
pub mod routes;
pub mod state;
pub mod validator;

pub use engine::{NextStateInfo, Progress, ProgressionEngine, StepOutcome};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::{ConversationTurn, OnboardingState, TurnRole};
