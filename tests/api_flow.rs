//! Integration tests for the REST surface.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! database and exercises the real HTTP contract, auth middleware included.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use fit_coach::auth::{IdentityProvider, StaticTokenIdentity, auth_middleware};
use fit_coach::onboarding::engine::ProgressionEngine;
use fit_coach::onboarding::{OnboardingRouteState, onboarding_routes};
use fit_coach::profile::materializer::ProfileMaterializer;
use fit_coach::profile::{ProfileLedger, ProfileRouteState, profile_routes};
use fit_coach::store::{Database, LibSqlBackend};

const TOKEN: &str = "tok-alice";

/// Start a server with onboarding + profile routes; returns its base URL.
async fn start_server() -> String {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let engine = Arc::new(ProgressionEngine::new(Arc::clone(&db)));
    let materializer = Arc::new(ProfileMaterializer::new(
        Arc::clone(&db),
        Arc::clone(&engine),
    ));
    let ledger = Arc::new(ProfileLedger::new(Arc::clone(&db)));

    let identity: Arc<dyn IdentityProvider> = Arc::new(StaticTokenIdentity::new([(
        TOKEN.to_string(),
        "alice".to_string(),
    )]));

    let app = axum::Router::new()
        .merge(onboarding_routes(OnboardingRouteState {
            engine,
            materializer,
        }))
        .merge(profile_routes(ProfileRouteState { ledger }))
        .layer(axum::middleware::from_fn_with_state(
            identity,
            auth_middleware,
        ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let response = client()
        .post(format!("{base}{path}"))
        .bearer_auth(TOKEN)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn post_empty(base: &str, path: &str) -> (u16, Value) {
    let response = client()
        .post(format!("{base}{path}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn get(base: &str, path: &str) -> (u16, Value) {
    let response = client()
        .get(format!("{base}{path}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

fn step_payload(state: u8) -> Value {
    let data = match state {
        1 => json!({"goals": ["build_muscle"]}),
        2 => json!({"experience_level": "intermediate", "current_activity": "moderate"}),
        3 => json!({"equipment": ["dumbbells"], "injuries": [], "limitations": []}),
        4 => json!({"days_per_week": 4, "session_minutes": 60}),
        5 => json!({"preferred_styles": ["strength"], "intensity": "moderate"}),
        6 => json!({"meals_per_day": 3, "dietary_restrictions": []}),
        7 => json!({"protein_pct": 30, "carbs_pct": 45, "fat_pct": 25}),
        8 => json!({"sleep_hours": 7.5, "stress_level": "low"}),
        9 => json!({"height_cm": 180, "weight_kg": 82.5, "age": 34}),
        other => panic!("no payload for state {other}"),
    };
    json!({"state": state, "data": data})
}

async fn onboard_fully(base: &str) {
    post_empty(base, "/api/onboarding/start").await;
    for state in 1..=9u8 {
        let (status, _) = post(base, "/api/onboarding/step", step_payload(state)).await;
        assert_eq!(status, 200, "state {state}");
    }
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let base = start_server().await;
    let response = client()
        .get(format!("{base}/api/onboarding/progress"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client()
        .get(format!("{base}/api/onboarding/progress"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn step_endpoint_walks_the_state_machine() {
    let base = start_server().await;
    let (status, state) = post_empty(&base, "/api/onboarding/start").await;
    assert_eq!(status, 200);
    assert_eq!(state["current_state"], 1);

    let (status, body) = post(&base, "/api/onboarding/step", step_payload(1)).await;
    assert_eq!(status, 200);
    assert_eq!(body["current_state"], 2);
    assert_eq!(body["is_complete"], false);
    assert_eq!(body["next_state"]["state"], 2);
    assert_eq!(body["next_state"]["domain_key"], "fitness_assessment");
}

#[tokio::test]
async fn workout_constraints_scenario() {
    let base = start_server().await;
    post_empty(&base, "/api/onboarding/start").await;
    for state in 1..=2u8 {
        post(&base, "/api/onboarding/step", step_payload(state)).await;
    }

    let (status, body) = post(
        &base,
        "/api/onboarding/step",
        json!({"state": 3, "data": {"equipment": ["dumbbells"], "injuries": [], "limitations": []}}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["current_state"], 4);

    let (_, progress) = get(&base, "/api/onboarding/progress").await;
    assert!(
        progress["completed_states"]
            .as_array()
            .unwrap()
            .contains(&json!(3))
    );
}

#[tokio::test]
async fn state_mismatch_is_a_conflict() {
    let base = start_server().await;
    post_empty(&base, "/api/onboarding/start").await;

    let (status, body) = post(&base, "/api/onboarding/step", step_payload(5)).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "state_mismatch");
    assert_eq!(body["claimed"], 5);
    assert_eq!(body["current"], 1);
}

#[tokio::test]
async fn validation_errors_name_the_fields() {
    let base = start_server().await;
    post_empty(&base, "/api/onboarding/start").await;

    let (status, body) = post(
        &base,
        "/api/onboarding/step",
        json!({"state": 1, "data": {"goals": ["get_swole"], "shoe_size": 44}}),
    )
    .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"], "validation_failed");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"goals"));
    assert!(fields.contains(&"shoe_size"));
}

#[tokio::test]
async fn progress_reports_percentage_and_completability() {
    let base = start_server().await;
    post_empty(&base, "/api/onboarding/start").await;

    let (_, progress) = get(&base, "/api/onboarding/progress").await;
    assert_eq!(progress["completion_percentage"], 0);
    assert_eq!(progress["can_complete"], false);

    for state in 1..=5u8 {
        post(&base, "/api/onboarding/step", step_payload(state)).await;
    }
    let (_, progress) = get(&base, "/api/onboarding/progress").await;
    assert_eq!(progress["current_state"], 6);
    assert_eq!(progress["completion_percentage"], 56);

    for state in 6..=9u8 {
        post(&base, "/api/onboarding/step", step_payload(state)).await;
    }
    let (_, progress) = get(&base, "/api/onboarding/progress").await;
    assert_eq!(progress["completion_percentage"], 100);
    assert_eq!(progress["is_complete"], true);
    assert_eq!(progress["can_complete"], true);
}

#[tokio::test]
async fn early_complete_is_rejected() {
    let base = start_server().await;
    post_empty(&base, "/api/onboarding/start").await;
    post(&base, "/api/onboarding/step", step_payload(1)).await;

    let (status, body) = post_empty(&base, "/api/onboarding/complete").await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "onboarding_incomplete");
    assert_eq!(body["completed"], 1);
    assert_eq!(body["total"], 9);

    let (status, _) = get(&base, "/api/profile").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn complete_materializes_a_locked_profile_once() {
    let base = start_server().await;
    onboard_fully(&base).await;

    let (status, profile) = post_empty(&base, "/api/onboarding/complete").await;
    assert_eq!(status, 201);
    assert_eq!(profile["locked"], true);
    assert_eq!(profile["user_id"], "alice");
    assert_eq!(
        profile["attributes"]["workout_constraints"]["equipment"],
        json!(["dumbbells"])
    );

    let (status, body) = post_empty(&base, "/api/onboarding/complete").await;
    assert_eq!(status, 409);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn profile_patch_respects_the_lock() {
    let base = start_server().await;
    onboard_fully(&base).await;
    post_empty(&base, "/api/onboarding/complete").await;

    // Locked, no unlock flag: rejected, no version row added.
    let response = client()
        .patch(format!("{base}/api/profile"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "updates": {"training_schedule": {"days_per_week": 5}},
            "reason": "more volume"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "profile_locked");

    let (_, versions) = get(&base, "/api/profile/versions").await;
    assert_eq!(versions.as_array().unwrap().len(), 1);

    // With unlock: applied, version 2 appended.
    let response = client()
        .patch(format!("{base}/api/profile"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "updates": {"training_schedule": {"days_per_week": 5}},
            "reason": "more volume",
            "unlock": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let profile: Value = response.json().await.unwrap();
    assert_eq!(profile["attributes"]["training_schedule"]["days_per_week"], 5);

    let (_, versions) = get(&base, "/api/profile/versions").await;
    let versions = versions.as_array().unwrap().clone();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version_number"], 2);
    assert_eq!(versions[0]["reason"], "more volume");
    assert_eq!(
        versions[0]["snapshot"]["attributes"]["training_schedule"]["days_per_week"],
        5
    );
}

#[tokio::test]
async fn lock_endpoint_relocks_without_a_version() {
    let base = start_server().await;
    onboard_fully(&base).await;
    post_empty(&base, "/api/onboarding/complete").await;

    let response = client()
        .patch(format!("{base}/api/profile"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "updates": {"locked": false},
            "reason": "open for edits",
            "unlock": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let (status, locked) = post_empty(&base, "/api/profile/lock").await;
    assert_eq!(status, 200);
    assert_eq!(locked["locked"], true);

    let (_, versions) = get(&base, "/api/profile/versions").await;
    // Materialization + the unlock edit; locking added nothing.
    assert_eq!(versions.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn status_returns_the_accumulated_context() {
    let base = start_server().await;
    post_empty(&base, "/api/onboarding/start").await;
    post(&base, "/api/onboarding/step", step_payload(1)).await;

    let (status, state) = get(&base, "/api/onboarding/status").await;
    assert_eq!(status, 200);
    assert_eq!(state["context"]["fitness_goals"]["goals"], json!(["build_muscle"]));
    assert_eq!(state["completed_states"], json!([1]));
}
