use axum::{
    extract::State,
    http::header::CACHE_CONTROL,
    response::{IntoResponse, Response},
    Json,
};

use crate::app::errors::ApiError;
use crate::app::AppState;

/// GET /.well-known/jwks.json
pub async fn jwks(State(state): State<AppState>) -> Result<Response, ApiError> {
    let jwks = state.tokens.jwks()?;
    Ok(([(CACHE_CONTROL, "public, max-age=3600")], Json(jwks)).into_response())
}
