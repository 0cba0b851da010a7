//! REST endpoints for the onboarding flow.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use super::engine::ProgressionEngine;
use crate::auth::Principal;
use crate::error::OnboardingError;
use crate::profile::materializer::ProfileMaterializer;
use crate::profile::routes::profile_error_response;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub engine: Arc<ProgressionEngine>,
    pub materializer: Arc<ProfileMaterializer>,
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/start", post(start))
        .route("/api/onboarding/step", post(submit_step))
        .route("/api/onboarding/progress", get(progress))
        .route("/api/onboarding/status", get(status))
        .route("/api/onboarding/complete", post(complete))
        .with_state(state)
}

/// Map an onboarding error to an HTTP response.
///
/// Validation and state-machine errors carry structure pointing at the
/// offending field or state; persistence failures surface opaquely.
pub(crate) fn onboarding_error_response(err: OnboardingError) -> Response {
    match &err {
        OnboardingError::Validation { state, errors } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": "validation_failed",
                "state": state,
                "fields": errors,
            })),
        )
            .into_response(),
        OnboardingError::StateMismatch { claimed, current } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "state_mismatch",
                "claimed": claimed,
                "current": current,
            })),
        )
            .into_response(),
        OnboardingError::Incomplete { completed, total } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "onboarding_incomplete",
                "completed": completed,
                "total": total,
            })),
        )
            .into_response(),
        OnboardingError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no onboarding state exists for this user"})),
        )
            .into_response(),
        OnboardingError::InvalidState(_) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
        OnboardingError::Database(e) => {
            tracing::error!(error = %e, "Onboarding persistence failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

/// POST /api/onboarding/start
///
/// Creates the user's onboarding state (idempotent) and returns it.
async fn start(
    State(state): State<OnboardingRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.engine.start(&principal.user_id).await {
        Ok(onboarding) => Json(onboarding).into_response(),
        Err(e) => onboarding_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    state: u8,
    data: serde_json::Value,
}

/// POST /api/onboarding/step
///
/// Synchronous alternative to streaming for submitting one state's data.
async fn submit_step(
    State(state): State<OnboardingRouteState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<StepRequest>,
) -> Response {
    match state
        .engine
        .submit_step(&principal.user_id, body.state, &body.data)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => onboarding_error_response(e),
    }
}

/// GET /api/onboarding/progress
async fn progress(
    State(state): State<OnboardingRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.engine.progress(&principal.user_id).await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => onboarding_error_response(e),
    }
}

/// GET /api/onboarding/status
///
/// The full onboarding state, including the accumulated context.
async fn status(
    State(state): State<OnboardingRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.engine.get_state(&principal.user_id).await {
        Ok(onboarding) => Json(onboarding).into_response(),
        Err(e) => onboarding_error_response(e),
    }
}

/// POST /api/onboarding/complete
///
/// Materializes the profile from the completed context. Fails unless all
/// states are done; fails with a conflict if a profile already exists.
async fn complete(
    State(state): State<OnboardingRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.materializer.create_profile(&principal.user_id).await {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(e) => profile_error_response(e),
    }
}
