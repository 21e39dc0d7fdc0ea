//! Login, callback, refresh and logout.
//!
//! The two OAuth legs are correlated through the single-use state store: the
//! callback consumes the state before it looks at anything else.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use huachuca_auth::{Principal, ACCESS_TOKEN_TTL_SECS};
use huachuca_core::AuthError;

use crate::app::errors::{json_error, ApiError};
use crate::app::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/google", get(login))
        .route("/callback/google", get(callback))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn provider_unavailable() -> Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "oauth_unavailable",
        "no identity provider is configured",
    )
}

/// GET /auth/login/google: redirect to the provider with a fresh state.
pub async fn login(State(state): State<AppState>) -> Response {
    let Some(provider) = state.identity.as_ref() else {
        return provider_unavailable();
    };
    let oauth_state = state.oauth_states.issue(state.login.state_ttl);
    Redirect::temporary(&provider.authorization_url(&oauth_state)).into_response()
}

/// GET /auth/callback/google?state&code
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let Some(oauth_state) = query.state.as_deref() else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "missing_state", "missing state parameter"));
    };
    if !state.oauth_states.validate_and_delete(oauth_state) {
        return Ok(json_error(StatusCode::BAD_REQUEST, "invalid_state", "invalid or expired state"));
    }
    let Some(code) = query.code.as_deref() else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "missing_code", "missing code parameter"));
    };
    let Some(provider) = state.identity.as_ref() else {
        return Ok(provider_unavailable());
    };

    let identity = provider.exchange(code).await?;

    let principal = match state.users.find_by_email(&identity.email).await? {
        Some(p) => p,
        None if state.login.auto_provision_owners => {
            let p = state.users.provision_owner(&identity.email, &identity.name).await?;
            info!(user_id = %p.id, organization_id = %p.organization_id, "provisioned owner on first login");
            p
        }
        None => {
            info!("login rejected for unknown email");
            return Err(AuthError::Unauthenticated.into());
        }
    };

    Ok(Json(issue_tokens(&state, &principal).await?).into_response())
}

/// POST /auth/refresh {"refresh_token"}: rotate and reissue.
pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Ok(Json(body)) = body else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "invalid_request", "invalid request body"));
    };

    let (refresh_token, principal) = state.sessions.rotate(&body.refresh_token).await?;
    let access_token = state.tokens.issue(&principal)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
    })
    .into_response())
}

/// POST /auth/logout {"refresh_token"}: drop the session. Idempotent.
pub async fn logout(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Ok(Json(body)) = body else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "invalid_request", "invalid request body"));
    };
    state.sessions.revoke_secret(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Access token plus a new refresh session (replacing any previous one).
async fn issue_tokens(state: &AppState, principal: &Principal) -> Result<TokenResponse, ApiError> {
    let access_token = state.tokens.issue(principal)?;
    let refresh_token = state.sessions.create(principal.id).await.map_err(|err| {
        warn!(user_id = %principal.id, "failed to create refresh session");
        err
    })?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
    })
}
