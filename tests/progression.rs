//! Integration tests for the progression engine, profile materializer, and
//! version ledger against an in-memory database.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use fit_coach::error::{OnboardingError, ProfileError};
use fit_coach::onboarding::engine::ProgressionEngine;
use fit_coach::profile::ledger::{ProfileLedger, ProfileUpdate};
use fit_coach::profile::materializer::ProfileMaterializer;
use fit_coach::store::{Database, LibSqlBackend};

async fn engine() -> (Arc<dyn Database>, Arc<ProgressionEngine>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let engine = Arc::new(ProgressionEngine::new(Arc::clone(&db)));
    (db, engine)
}

/// Valid payload for each of the 9 states.
fn payload_for(state: u8) -> Value {
    match state {
        1 => json!({"goals": ["build_muscle"], "motivation": "stay strong"}),
        2 => json!({"experience_level": "intermediate", "current_activity": "moderate"}),
        3 => json!({"equipment": ["dumbbells"], "injuries": [], "limitations": []}),
        4 => json!({"days_per_week": 4, "session_minutes": 60}),
        5 => json!({"preferred_styles": ["strength"], "intensity": "moderate"}),
        6 => json!({"meals_per_day": 3, "dietary_restrictions": []}),
        7 => json!({"protein_pct": 30, "carbs_pct": 45, "fat_pct": 25}),
        8 => json!({"sleep_hours": 7.5, "stress_level": "low"}),
        9 => json!({"height_cm": 180, "weight_kg": 82.5, "age": 34}),
        other => panic!("no payload for state {other}"),
    }
}

async fn walk_to_completion(engine: &ProgressionEngine, user: &str) {
    engine.start(user).await.unwrap();
    for state in 1..=9u8 {
        engine
            .submit_step(user, state, &payload_for(state))
            .await
            .unwrap();
    }
}

fn updates(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

// ── Progression ─────────────────────────────────────────────────────

#[tokio::test]
async fn full_walk_advances_through_all_nine_states() {
    let (_db, engine) = engine().await;
    engine.start("alice").await.unwrap();

    for state in 1..=9u8 {
        let before = engine.get_state("alice").await.unwrap();
        assert_eq!(before.current_state, state);

        let outcome = engine
            .submit_step("alice", state, &payload_for(state))
            .await
            .unwrap();

        if state < 9 {
            assert_eq!(outcome.current_state, state + 1);
            assert!(!outcome.is_complete);
        } else {
            assert!(outcome.is_complete);
        }

        let after = engine.get_state("alice").await.unwrap();
        assert!(after.completed_states.contains(&state));
        assert_eq!(after.completed_states.len(), state as usize);
    }
}

#[tokio::test]
async fn start_is_idempotent() {
    let (_db, engine) = engine().await;
    let first = engine.start("alice").await.unwrap();
    engine
        .submit_step("alice", 1, &payload_for(1))
        .await
        .unwrap();
    let again = engine.start("alice").await.unwrap();

    assert_eq!(first.user_id, again.user_id);
    // A repeated start never resets progress.
    assert_eq!(again.current_state, 2);
}

#[tokio::test]
async fn state_mismatch_leaves_everything_unchanged() {
    let (_db, engine) = engine().await;
    engine.start("alice").await.unwrap();
    engine
        .submit_step("alice", 1, &payload_for(1))
        .await
        .unwrap();

    for claimed in [1u8, 3, 9] {
        let err = engine
            .submit_step("alice", claimed, &payload_for(claimed))
            .await
            .unwrap_err();
        match err {
            OnboardingError::StateMismatch { claimed: c, current } => {
                assert_eq!(c, claimed);
                assert_eq!(current, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    let state = engine.get_state("alice").await.unwrap();
    assert_eq!(state.current_state, 2);
    assert_eq!(state.completed_states.len(), 1);
    assert_eq!(state.context.len(), 1);
}

#[tokio::test]
async fn validation_failure_mutates_nothing() {
    let (_db, engine) = engine().await;
    engine.start("alice").await.unwrap();

    let err = engine
        .submit_step("alice", 1, &json!({"goals": []}))
        .await
        .unwrap_err();
    assert!(matches!(err, OnboardingError::Validation { .. }), "{err}");

    let state = engine.get_state("alice").await.unwrap();
    assert_eq!(state.current_state, 1);
    assert!(state.completed_states.is_empty());
    assert!(state.context.is_empty());
}

#[tokio::test]
async fn resubmission_of_current_state_replaces_without_double_count() {
    let (_db, engine) = engine().await;
    engine.start("alice").await.unwrap();
    // State 3 scenario: equipment only, then corrected.
    engine
        .submit_step("alice", 1, &payload_for(1))
        .await
        .unwrap();
    engine
        .submit_step("alice", 2, &payload_for(2))
        .await
        .unwrap();

    let outcome = engine
        .submit_step(
            "alice",
            3,
            &json!({"equipment": ["dumbbells"], "injuries": [], "limitations": []}),
        )
        .await
        .unwrap();
    assert_eq!(outcome.current_state, 4);

    let state = engine.get_state("alice").await.unwrap();
    assert!(state.completed_states.contains(&3));
    assert_eq!(
        state.context["workout_constraints"]["equipment"],
        json!(["dumbbells"])
    );
}

#[tokio::test]
async fn completion_percentage_tracks_completed_states() {
    let (_db, engine) = engine().await;
    engine.start("alice").await.unwrap();

    let expected = [11u8, 22, 33, 44, 56, 67, 78, 89, 100];
    for state in 1..=9u8 {
        engine
            .submit_step("alice", state, &payload_for(state))
            .await
            .unwrap();
        let progress = engine.progress("alice").await.unwrap();
        assert_eq!(
            progress.completion_percentage,
            expected[state as usize - 1],
            "after state {state}"
        );
    }

    let progress = engine.progress("alice").await.unwrap();
    assert!(progress.is_complete);
    assert!(progress.can_complete);
}

#[tokio::test]
async fn completed_onboarding_is_immutable() {
    let (_db, engine) = engine().await;
    walk_to_completion(&engine, "alice").await;

    for state in 1..=9u8 {
        let err = engine
            .submit_step("alice", state, &payload_for(state))
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::StateMismatch { .. }), "{err}");
    }

    let state = engine.get_state("alice").await.unwrap();
    assert!(state.is_complete);
    assert_eq!(state.completed_states.len(), 9);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let (_db, engine) = engine().await;
    let err = engine.get_state("ghost").await.unwrap_err();
    assert!(matches!(err, OnboardingError::NotFound { .. }), "{err}");
}

#[tokio::test]
async fn concurrent_submissions_for_one_user_serialize() {
    let (_db, engine) = engine().await;
    engine.start("alice").await.unwrap();

    // Both tasks claim state 1; exactly one may advance, the other must
    // observe the already-advanced pointer.
    let a = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.submit_step("alice", 1, &payload_for(1)).await })
    };
    let b = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.submit_step("alice", 1, &payload_for(1)).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one submission may advance");

    let state = engine.get_state("alice").await.unwrap();
    assert_eq!(state.current_state, 2);
    assert_eq!(state.completed_states.len(), 1);
}

// ── Materializer ────────────────────────────────────────────────────

#[tokio::test]
async fn early_complete_fails_and_creates_no_profile() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    engine.start("alice").await.unwrap();

    let err = materializer.create_profile("alice").await.unwrap_err();
    match err {
        ProfileError::Onboarding(OnboardingError::Incomplete { completed, total }) => {
            assert_eq!(completed, 0);
            assert_eq!(total, 9);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(db.get_profile("alice").await.unwrap().is_none());
}

#[tokio::test]
async fn materialized_profile_is_locked_with_version_one() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    walk_to_completion(&engine, "alice").await;

    let profile = materializer.create_profile("alice").await.unwrap();
    assert!(profile.locked);
    assert_eq!(profile.attributes.training_schedule.days_per_week, 4);
    assert_eq!(profile.attributes.nutrition_targets.protein_pct, 30);

    let versions = db.list_profile_versions(profile.id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, 1);
    assert_eq!(versions[0].reason, "onboarding completed");
    assert_eq!(versions[0].snapshot["locked"], json!(true));
}

#[tokio::test]
async fn second_materialization_is_a_conflict() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    walk_to_completion(&engine, "alice").await;

    materializer.create_profile("alice").await.unwrap();
    let err = materializer.create_profile("alice").await.unwrap_err();
    assert!(matches!(err, ProfileError::Conflict { .. }), "{err}");
}

// ── Lock guard and version ledger ───────────────────────────────────

#[tokio::test]
async fn locked_profile_rejects_update_without_unlock() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    let ledger = ProfileLedger::new(Arc::clone(&db));
    walk_to_completion(&engine, "alice").await;
    let profile = materializer.create_profile("alice").await.unwrap();

    let err = ledger
        .update_profile(
            "alice",
            ProfileUpdate {
                updates: updates(json!({"training_schedule": {"days_per_week": 5}})),
                reason: "more training".to_string(),
                unlock: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProfileError::Locked), "{err}");

    // No mutation, no version row.
    let reloaded = ledger.get("alice").await.unwrap();
    assert_eq!(reloaded.attributes.training_schedule.days_per_week, 4);
    assert_eq!(db.list_profile_versions(profile.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sequential_updates_number_two_then_three() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    let ledger = ProfileLedger::new(Arc::clone(&db));
    walk_to_completion(&engine, "alice").await;
    materializer.create_profile("alice").await.unwrap();

    let updated = ledger
        .update_profile(
            "alice",
            ProfileUpdate {
                updates: updates(json!({"training_schedule": {"days_per_week": 5}})),
                reason: "adding a day".to_string(),
                unlock: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.attributes.training_schedule.days_per_week, 5);
    // The lock flag survives an unlock=true mutation unless changed.
    assert!(updated.locked);

    ledger.lock_profile("alice").await.unwrap();

    let updated = ledger
        .update_profile(
            "alice",
            ProfileUpdate {
                updates: updates(json!({"body_metrics": {"weight_kg": 80.0}})),
                reason: "monthly weigh-in".to_string(),
                unlock: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.attributes.body_metrics.weight_kg, 80.0);

    let versions = ledger.versions("alice").await.unwrap();
    let numbers: Vec<i64> = versions.iter().map(|v| v.version_number).collect();
    // Newest first, never repeated or skipped.
    assert_eq!(numbers, vec![3, 2, 1]);
    assert_eq!(versions[0].reason, "monthly weigh-in");
    assert_eq!(
        versions[0].snapshot["attributes"]["body_metrics"]["weight_kg"],
        json!(80.0)
    );
}

#[tokio::test]
async fn empty_reason_is_rejected_before_any_write() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    let ledger = ProfileLedger::new(Arc::clone(&db));
    walk_to_completion(&engine, "alice").await;
    let profile = materializer.create_profile("alice").await.unwrap();

    let err = ledger
        .update_profile(
            "alice",
            ProfileUpdate {
                updates: updates(json!({"training_schedule": {"days_per_week": 5}})),
                reason: "   ".to_string(),
                unlock: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProfileError::MissingReason), "{err}");
    assert_eq!(db.list_profile_versions(profile.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn explicit_locked_update_unlocks_and_relock_writes_no_version() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    let ledger = ProfileLedger::new(Arc::clone(&db));
    walk_to_completion(&engine, "alice").await;
    materializer.create_profile("alice").await.unwrap();

    let unlocked = ledger
        .update_profile(
            "alice",
            ProfileUpdate {
                updates: updates(json!({"locked": false})),
                reason: "opening for edits".to_string(),
                unlock: true,
            },
        )
        .await
        .unwrap();
    assert!(!unlocked.locked);

    // Now unlocked, updates need no unlock flag.
    ledger
        .update_profile(
            "alice",
            ProfileUpdate {
                updates: updates(json!({"workout_planning": {"intensity": "high"}})),
                reason: "pushing harder".to_string(),
                unlock: false,
            },
        )
        .await
        .unwrap();

    let relocked = ledger.lock_profile("alice").await.unwrap();
    assert!(relocked.locked);

    let versions = ledger.versions("alice").await.unwrap();
    // Materialization + two updates; lock_profile adds nothing.
    assert_eq!(versions.len(), 3);
}

#[tokio::test]
async fn state_survives_a_database_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fit-coach.db");

    {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        let engine = ProgressionEngine::new(db);
        engine.start("alice").await.unwrap();
        engine
            .submit_step("alice", 1, &payload_for(1))
            .await
            .unwrap();
    }

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let engine = ProgressionEngine::new(db);
    let state = engine.get_state("alice").await.unwrap();
    assert_eq!(state.current_state, 2);
    assert!(state.completed_states.contains(&1));
    assert_eq!(state.context["fitness_goals"]["goals"], json!(["build_muscle"]));
}

#[tokio::test]
async fn soft_deleted_user_loses_state_and_profile() {
    let (db, engine) = engine().await;
    let materializer = ProfileMaterializer::new(Arc::clone(&db), Arc::clone(&engine));
    walk_to_completion(&engine, "alice").await;
    materializer.create_profile("alice").await.unwrap();

    db.soft_delete_user_data("alice").await.unwrap();

    assert!(matches!(
        engine.get_state("alice").await.unwrap_err(),
        OnboardingError::NotFound { .. }
    ));
    assert!(db.get_profile("alice").await.unwrap().is_none());
}
