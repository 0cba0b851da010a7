//! REST endpoints for the materialized profile and its version ledger.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::Map;

use crate::auth::Principal;
use crate::error::ProfileError;
use crate::profile::ledger::{ProfileLedger, ProfileUpdate};

/// Shared state for profile routes.
#[derive(Clone)]
pub struct ProfileRouteState {
    pub ledger: Arc<ProfileLedger>,
}

/// Build the profile REST routes.
pub fn profile_routes(state: ProfileRouteState) -> Router {
    Router::new()
        .route("/api/profile", get(get_profile).patch(update_profile))
        .route("/api/profile/lock", post(lock_profile))
        .route("/api/profile/versions", get(versions))
        .with_state(state)
}

/// Map a profile error to an HTTP response.
pub(crate) fn profile_error_response(err: ProfileError) -> Response {
    match &err {
        ProfileError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no profile exists for this user"})),
        )
            .into_response(),
        ProfileError::Conflict { .. } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "a profile already exists for this user"})),
        )
            .into_response(),
        ProfileError::Locked => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "profile_locked",
                "detail": err.to_string(),
            })),
        )
            .into_response(),
        ProfileError::MissingReason
        | ProfileError::InvalidUpdate { .. }
        | ProfileError::MalformedContext { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
        ProfileError::Onboarding(inner) => onboarding_passthrough(inner),
        ProfileError::Database(e) => {
            tracing::error!(error = %e, "Profile persistence failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}

fn onboarding_passthrough(err: &crate::error::OnboardingError) -> Response {
    use crate::error::OnboardingError;
    match err {
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
        other => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": other.to_string()})),
        )
            .into_response(),
    }
}

/// GET /api/profile
async fn get_profile(
    State(state): State<ProfileRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.ledger.get(&principal.user_id).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => profile_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    updates: Map<String, serde_json::Value>,
    reason: String,
    #[serde(default)]
    unlock: bool,
}

/// PATCH /api/profile
///
/// Applies section patches and appends the next version row. Locked
/// profiles reject mutation unless `unlock` is set.
async fn update_profile(
    State(state): State<ProfileRouteState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<UpdateRequest>,
) -> Response {
    let update = ProfileUpdate {
        updates: body.updates,
        reason: body.reason,
        unlock: body.unlock,
    };
    match state.ledger.update_profile(&principal.user_id, update).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => profile_error_response(e),
    }
}

/// POST /api/profile/lock
///
/// Relocks the profile. Not a data change, so no version row is written.
async fn lock_profile(
    State(state): State<ProfileRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.ledger.lock_profile(&principal.user_id).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => profile_error_response(e),
    }
}

/// GET /api/profile/versions
///
/// The append-only version ledger, newest first.
async fn versions(
    State(state): State<ProfileRouteState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    match state.ledger.versions(&principal.user_id).await {
        Ok(versions) => Json(versions).into_response(),
        Err(e) => profile_error_response(e),
    }
}
