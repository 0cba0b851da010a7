//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Transaction, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::state::{ConversationTurn, OnboardingState, TurnRole};
use crate::profile::model::{Profile, ProfileAttributes, ProfileVersion};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn begin(&self) -> Result<Transaction, DatabaseError> {
        self.conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to begin transaction: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn map_query(e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(message)
    } else {
        DatabaseError::Query(message)
    }
}

/// Map a libsql Row to an OnboardingState.
///
/// Column order: 0:user_id, 1:current_state, 2:completed_states, 3:context,
/// 4:is_complete, 5:created_at, 6:updated_at
fn row_to_onboarding_state(row: &libsql::Row) -> Result<OnboardingState, DatabaseError> {
    let user_id: String = row.get(0).map_err(map_query)?;
    let current_state: i64 = row.get(1).map_err(map_query)?;
    let completed_str: String = row.get(2).map_err(map_query)?;
    let context_str: String = row.get(3).map_err(map_query)?;
    let is_complete: i64 = row.get(4).map_err(map_query)?;
    let created_str: String = row.get(5).map_err(map_query)?;
    let updated_str: String = row.get(6).map_err(map_query)?;

    let completed_states: BTreeSet<u8> = serde_json::from_str(&completed_str).map_err(|e| {
        DatabaseError::Serialization(format!("Bad completed_states for {user_id}: {e}"))
    })?;
    let context: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&context_str)
        .map_err(|e| DatabaseError::Serialization(format!("Bad context for {user_id}: {e}")))?;

    Ok(OnboardingState {
        user_id,
        current_state: current_state as u8,
        completed_states,
        context,
        is_complete: is_complete != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a ConversationTurn.
///
/// Column order: 0:id, 1:role, 2:content, 3:state_at, 4:created_at
fn row_to_turn(row: &libsql::Row) -> Result<ConversationTurn, DatabaseError> {
    let id_str: String = row.get(0).map_err(map_query)?;
    let role_str: String = row.get(1).map_err(map_query)?;
    let content: String = row.get(2).map_err(map_query)?;
    let state_at: i64 = row.get(3).map_err(map_query)?;
    let created_str: String = row.get(4).map_err(map_query)?;

    let role: TurnRole = role_str
        .parse()
        .map_err(|e: String| DatabaseError::Serialization(e))?;

    Ok(ConversationTurn {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("Bad turn id: {e}")))?,
        role,
        content,
        state_at: state_at as u8,
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a Profile.
///
/// Column order: 0:id, 1:user_id, 2:locked, 3:attributes, 4:created_at, 5:updated_at
fn row_to_profile(row: &libsql::Row) -> Result<Profile, DatabaseError> {
    let id_str: String = row.get(0).map_err(map_query)?;
    let user_id: String = row.get(1).map_err(map_query)?;
    let locked: i64 = row.get(2).map_err(map_query)?;
    let attributes_str: String = row.get(3).map_err(map_query)?;
    let created_str: String = row.get(4).map_err(map_query)?;
    let updated_str: String = row.get(5).map_err(map_query)?;

    let attributes: ProfileAttributes = serde_json::from_str(&attributes_str).map_err(|e| {
        DatabaseError::Serialization(format!("Bad profile attributes for {user_id}: {e}"))
    })?;

    Ok(Profile {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("Bad profile id: {e}")))?,
        user_id,
        locked: locked != 0,
        attributes,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a ProfileVersion.
///
/// Column order: 0:id, 1:profile_id, 2:version_number, 3:reason, 4:snapshot, 5:created_at
fn row_to_version(row: &libsql::Row) -> Result<ProfileVersion, DatabaseError> {
    let id_str: String = row.get(0).map_err(map_query)?;
    let profile_id_str: String = row.get(1).map_err(map_query)?;
    let version_number: i64 = row.get(2).map_err(map_query)?;
    let reason: String = row.get(3).map_err(map_query)?;
    let snapshot_str: String = row.get(4).map_err(map_query)?;
    let created_str: String = row.get(5).map_err(map_query)?;

    let snapshot: serde_json::Value = serde_json::from_str(&snapshot_str)
        .map_err(|e| DatabaseError::Serialization(format!("Bad version snapshot: {e}")))?;

    Ok(ProfileVersion {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("Bad version id: {e}")))?,
        profile_id: Uuid::parse_str(&profile_id_str)
            .map_err(|e| DatabaseError::Serialization(format!("Bad version profile id: {e}")))?,
        version_number,
        reason,
        snapshot,
        created_at: parse_datetime(&created_str),
    })
}

fn serialize_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn create_onboarding_state(
        &self,
        state: &OnboardingState,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO onboarding_states
                    (user_id, current_state, completed_states, context, is_complete,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    state.user_id.as_str(),
                    state.current_state as i64,
                    serialize_json(&state.completed_states)?,
                    serialize_json(&state.context)?,
                    state.is_complete as i64,
                    state.created_at.to_rfc3339(),
                    state.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;
        Ok(())
    }

    async fn get_onboarding_state(
        &self,
        user_id: &str,
    ) -> Result<Option<OnboardingState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, current_state, completed_states, context, is_complete,
                        created_at, updated_at
                 FROM onboarding_states
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id],
            )
            .await
            .map_err(map_query)?;

        match rows.next().await.map_err(map_query)? {
            Some(row) => Ok(Some(row_to_onboarding_state(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_onboarding_state(&self, state: &OnboardingState) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE onboarding_states
                 SET current_state = ?2, completed_states = ?3, context = ?4,
                     is_complete = ?5, updated_at = ?6
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![
                    state.user_id.as_str(),
                    state.current_state as i64,
                    serialize_json(&state.completed_states)?,
                    serialize_json(&state.context)?,
                    state.is_complete as i64,
                    state.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;
        Ok(())
    }

    async fn append_conversation_turn(
        &self,
        user_id: &str,
        turn: &ConversationTurn,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO conversation_turns (id, user_id, role, content, state_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    turn.id.to_string(),
                    user_id,
                    turn.role.to_string(),
                    turn.content.as_str(),
                    turn.state_at as i64,
                    turn.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;
        Ok(())
    }

    async fn list_conversation_turns(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, role, content, state_at, created_at
                 FROM conversation_turns
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await
            .map_err(map_query)?;

        let mut turns = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_query)? {
            turns.push(row_to_turn(&row)?);
        }
        Ok(turns)
    }

    async fn create_profile_with_version(
        &self,
        profile: &Profile,
        version: &ProfileVersion,
    ) -> Result<(), DatabaseError> {
        let attributes = serialize_json(&profile.attributes)?;
        let snapshot = serialize_json(&version.snapshot)?;

        let tx = self.begin().await?;
        let result = async {
            tx.execute(
                "INSERT INTO profiles (id, user_id, locked, attributes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    profile.id.to_string(),
                    profile.user_id.as_str(),
                    profile.locked as i64,
                    attributes.as_str(),
                    profile.created_at.to_rfc3339(),
                    profile.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;

            tx.execute(
                "INSERT INTO profile_versions
                    (id, profile_id, version_number, reason, snapshot, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    version.id.to_string(),
                    version.profile_id.to_string(),
                    version.version_number,
                    version.reason.as_str(),
                    snapshot.as_str(),
                    version.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;
            Ok::<(), DatabaseError>(())
        }
        .await;

        match result {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| DatabaseError::Query(format!("Commit failed: {e}"))),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, locked, attributes, created_at, updated_at
                 FROM profiles
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id],
            )
            .await
            .map_err(map_query)?;

        match rows.next().await.map_err(map_query)? {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_profile_with_version(
        &self,
        profile: &Profile,
        reason: &str,
    ) -> Result<i64, DatabaseError> {
        let attributes = serialize_json(&profile.attributes)?;
        let snapshot = serialize_json(profile)?;

        let tx = self.begin().await?;
        let result = async {
            // The next version number is computed inside the transaction so
            // two concurrent updates cannot both observe the same max.
            let mut rows = tx
                .query(
                    "SELECT COALESCE(MAX(version_number), 0)
                     FROM profile_versions WHERE profile_id = ?1",
                    params![profile.id.to_string()],
                )
                .await
                .map_err(map_query)?;
            let next_version: i64 = match rows.next().await.map_err(map_query)? {
                Some(row) => row.get::<i64>(0).map_err(map_query)? + 1,
                None => 1,
            };

            tx.execute(
                "UPDATE profiles
                 SET locked = ?2, attributes = ?3, updated_at = ?4
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![
                    profile.id.to_string(),
                    profile.locked as i64,
                    attributes.as_str(),
                    profile.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;

            tx.execute(
                "INSERT INTO profile_versions
                    (id, profile_id, version_number, reason, snapshot, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    profile.id.to_string(),
                    next_version,
                    reason,
                    snapshot.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(map_query)?;

            Ok::<i64, DatabaseError>(next_version)
        }
        .await;

        match result {
            Ok(version) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("Commit failed: {e}")))?;
                Ok(version)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn set_profile_locked(
        &self,
        user_id: &str,
        locked: bool,
    ) -> Result<Option<Profile>, DatabaseError> {
        self.conn()
            .execute(
                "UPDATE profiles
                 SET locked = ?2, updated_at = ?3
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id, locked as i64, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(map_query)?;
        self.get_profile(user_id).await
    }

    async fn list_profile_versions(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<ProfileVersion>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, profile_id, version_number, reason, snapshot, created_at
                 FROM profile_versions
                 WHERE profile_id = ?1
                 ORDER BY version_number DESC",
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_query)?;

        let mut versions = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_query)? {
            versions.push(row_to_version(&row)?);
        }
        Ok(versions)
    }

    async fn soft_delete_user_data(&self, user_id: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let tx = self.begin().await?;
        let result = async {
            tx.execute(
                "UPDATE onboarding_states SET deleted_at = ?2
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id, now.as_str()],
            )
            .await
            .map_err(map_query)?;
            tx.execute(
                "UPDATE profiles SET deleted_at = ?2
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id, now.as_str()],
            )
            .await
            .map_err(map_query)?;
            Ok::<(), DatabaseError>(())
        }
        .await;

        match result {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| DatabaseError::Query(format!("Commit failed: {e}"))),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn onboarding_state_roundtrip() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let mut state = OnboardingState::new("alice");
        backend.create_onboarding_state(&state).await.unwrap();

        state.current_state = 2;
        state.completed_states.insert(1);
        state.context.insert(
            "fitness_goals".to_string(),
            serde_json::json!({"goals": ["build_muscle"]}),
        );
        backend.save_onboarding_state(&state).await.unwrap();

        let loaded = backend
            .get_onboarding_state("alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.current_state, 2);
        assert!(loaded.completed_states.contains(&1));
        assert_eq!(loaded.context["fitness_goals"]["goals"][0], "build_muscle");
    }

    #[tokio::test]
    async fn duplicate_onboarding_state_is_a_constraint_error() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let state = OnboardingState::new("alice");
        backend.create_onboarding_state(&state).await.unwrap();
        let err = backend.create_onboarding_state(&state).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)), "{err}");
    }

    #[tokio::test]
    async fn conversation_turns_append_in_order() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        for (i, content) in ["hi", "hello", "let's start"].iter().enumerate() {
            let role = if i % 2 == 0 {
                TurnRole::User
            } else {
                TurnRole::Assistant
            };
            let turn = ConversationTurn::new(role, *content, 1);
            backend.append_conversation_turn("alice", &turn).await.unwrap();
        }

        let turns = backend.list_conversation_turns("alice", 100).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[2].content, "let's start");
    }

    #[tokio::test]
    async fn soft_deleted_state_is_invisible() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let state = OnboardingState::new("alice");
        backend.create_onboarding_state(&state).await.unwrap();
        backend.soft_delete_user_data("alice").await.unwrap();
        assert!(backend.get_onboarding_state("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_state_reads_as_none() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        assert!(backend.get_onboarding_state("ghost").await.unwrap().is_none());
        assert!(backend.get_profile("ghost").await.unwrap().is_none());
    }
}
