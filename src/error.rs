//! Error types for Fit Coach.

use serde::Serialize;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A single invalid field reported by the step validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Onboarding state-machine and validation errors.
///
/// These are returned synchronously, carry enough structure to point at the
/// offending field or state, and never partially apply.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Validation failed for state {state}: {}", format_field_errors(errors))]
    Validation { state: u8, errors: Vec<FieldError> },

    #[error("Claimed state {claimed} does not match current state {current}")]
    StateMismatch { claimed: u8, current: u8 },

    #[error("Onboarding is not complete ({completed} of {total} states done)")]
    Incomplete { completed: usize, total: usize },

    #[error("No onboarding state exists for user {user_id}")]
    NotFound { user_id: String },

    #[error("State number {0} is outside the valid range 1..=9")]
    InvalidState(u8),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Profile materialization, locking, and version-ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("No profile exists for user {user_id}")]
    NotFound { user_id: String },

    #[error("A profile already exists for user {user_id}")]
    Conflict { user_id: String },

    #[error("Profile is locked; pass unlock=true to modify it")]
    Locked,

    #[error("A non-empty reason is required for profile mutations")]
    MissingReason,

    #[error("Invalid update for section {section}: {reason}")]
    InvalidUpdate { section: String, reason: String },

    #[error("Context section {section} is missing or malformed: {reason}")]
    MalformedContext { section: String, reason: String },

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Streaming transport errors.
///
/// A stream always terminates with exactly one `error` event carrying the
/// rendered message; it must never hang open after one of these.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Upstream agent failed: {0}")]
    Upstream(String),

    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("No agent activity within {seconds}s, closing stream")]
    IdleTimeout { seconds: u64 },

    #[error("Superseded by a newer stream")]
    Superseded,
}

/// Authentication and authorization errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid bearer token")]
    InvalidToken,

    #[error("Capability {capability} is not available after onboarding")]
    CapabilityNotAllowed { capability: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_fields() {
        let err = OnboardingError::Validation {
            state: 7,
            errors: vec![
                FieldError::new("protein_pct", "must be between 0 and 100"),
                FieldError::new("fat_pct", "missing required field"),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("state 7"));
        assert!(rendered.contains("protein_pct"));
        assert!(rendered.contains("fat_pct"));
    }

    #[test]
    fn state_mismatch_names_both_states() {
        let err = OnboardingError::StateMismatch {
            claimed: 5,
            current: 3,
        };
        let rendered = err.to_string();
        assert!(rendered.contains('5'));
        assert!(rendered.contains('3'));
    }
}
