use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use huachuca_core::AuthError;

/// `{"error": code, "message": message}` with `status`.
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": "unauthorized" }))).into_response()
}

pub fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, axum::Json(json!({ "error": "forbidden" }))).into_response()
}

/// Map the core taxonomy onto HTTP.
///
/// Authentication and authorization failures carry no detail. Store and
/// internal failures are logged redacted and answered generically.
pub fn auth_error_response(err: AuthError) -> Response {
    match err {
        AuthError::Unauthenticated => unauthorized(),
        AuthError::Forbidden => forbidden(),
        AuthError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        AuthError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        AuthError::Transient(msg) => {
            huachuca_observability::log_error(&msg, "backing store unavailable");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "service temporarily unavailable",
            )
        }
        AuthError::Internal(msg) => {
            huachuca_observability::log_error(&msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal server error")
        }
    }
}

/// Handler error type: anything convertible into [`AuthError`].
#[derive(Debug)]
pub struct ApiError(pub AuthError);

macro_rules! api_error_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for ApiError {
                fn from(err: $t) -> Self {
                    ApiError(err.into())
                }
            }
        )*
    };
}

api_error_from!(
    AuthError,
    huachuca_auth::TokenError,
    huachuca_auth::RefreshError,
    huachuca_auth::StoreError,
    huachuca_auth::AuthzError,
);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        auth_error_response(self.0)
    }
}
