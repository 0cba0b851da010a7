//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::state::{ConversationTurn, OnboardingState};
use crate::profile::model::{Profile, ProfileVersion};

/// Backend-agnostic database trait covering onboarding state, conversation
/// logs, profiles, and the version ledger.
///
/// All reads filter soft-deleted rows. Multi-row writes (profile + version)
/// are atomic: a partial result is never observable.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Onboarding state ────────────────────────────────────────────

    /// Insert a fresh onboarding state row. Fails with `Constraint` if the
    /// user already has one (1:1, enforced unique).
    async fn create_onboarding_state(&self, state: &OnboardingState)
        -> Result<(), DatabaseError>;

    /// Load a user's onboarding state, if any.
    async fn get_onboarding_state(
        &self,
        user_id: &str,
    ) -> Result<Option<OnboardingState>, DatabaseError>;

    /// Persist the full state row (context, completed set, pointer, flag)
    /// as one atomic write.
    async fn save_onboarding_state(&self, state: &OnboardingState) -> Result<(), DatabaseError>;

    // ── Conversation log (append-only) ──────────────────────────────

    /// Append one turn. Rows are never updated or deleted.
    async fn append_conversation_turn(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
    ) -> Result<(), DatabaseError>;

    /// List a user's turns in chronological order, up to `limit`.
    async fn list_conversation_turns(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError>;

    // ── Profiles and the version ledger ─────────────────────────────

    /// Create the profile and its first version in one transaction.
    /// Fails with `Constraint` if a non-deleted profile already exists.
    async fn create_profile_with_version(
        &self,
        profile: &Profile,
        version: &ProfileVersion,
    ) -> Result<(), DatabaseError>;

    /// Load a user's non-deleted profile, if any.
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError>;

    /// Apply a profile mutation and write the next version row in one
    /// transaction. The version number is computed inside the same
    /// transaction. Returns the assigned version number.
    async fn update_profile_with_version(
        &self,
        profile: &Profile,
        reason: &str,
    ) -> Result<i64, DatabaseError>;

    /// Flip the lock flag without writing a version row.
    async fn set_profile_locked(
        &self,
        user_id: &str,
        locked: bool,
    ) -> Result<Option<Profile>, DatabaseError>;

    /// List a profile's version ledger, newest first.
    async fn list_profile_versions(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<ProfileVersion>, DatabaseError>;

    // ── Account lifecycle ───────────────────────────────────────────

    /// Soft-delete a user's onboarding state and profile.
    async fn soft_delete_user_data(&self, user_id: &str) -> Result<(), DatabaseError>;
}
