//! Token-based identity — opaque bearer token in, validated principal out.
//!
//! The actual token scheme is a collaborator concern; this module only
//! defines the narrow `IdentityProvider` interface, a static-token
//! implementation for single-box deployments and tests, and the Axum
//! middleware that attaches the authenticated [`Principal`] to the request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::AuthError;

/// An authenticated user.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
}

/// Validates opaque bearer tokens into principals.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Static token table, configured as `token:user_id` pairs.
///
/// Reads `FIT_COACH_TOKENS` (comma-separated `token:user_id` entries).
pub struct StaticTokenIdentity {
    tokens: HashMap<String, String>,
}

impl StaticTokenIdentity {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: pairs.into_iter().collect(),
        }
    }

    /// Build from the `FIT_COACH_TOKENS` environment variable.
    /// Returns `None` when the variable is unset or holds no valid pairs.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var("FIT_COACH_TOKENS").ok()?;
        let tokens: HashMap<String, String> = raw
            .split(',')
            .filter_map(|entry| {
                let (token, user_id) = entry.trim().split_once(':')?;
                if token.is_empty() || user_id.is_empty() {
                    return None;
                }
                Some((token.to_string(), user_id.to_string()))
            })
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(token)
            .map(|user_id| Principal {
                user_id: user_id.clone(),
            })
            .ok_or(AuthError::InvalidToken)
    }
}

/// Bearer-token middleware.
///
/// `/health` is always allowed (for load balancer checks). All other routes
/// require `Authorization: Bearer <token>`; on success the [`Principal`] is
/// inserted into request extensions for handlers to extract.
pub async fn auth_middleware(
    State(identity): State<Arc<dyn IdentityProvider>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized(&AuthError::MissingToken);
    };

    match identity.authenticate(token).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authentication failed");
            unauthorized(&e)
        }
    }
}

fn unauthorized(err: &AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": err.to_string()})),
    )
        .into_response()
}
