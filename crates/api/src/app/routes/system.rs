use std::time::Duration;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;
use crate::context::PrincipalContext;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub checks: Vec<HealthCheck>,
    pub check_time: DateTime<Utc>,
}

/// GET /health: 200 when every check passes, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let session_store = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.sessions.store().ping()).await {
        Ok(Ok(())) => HealthCheck {
            name: "session_store",
            status: HealthStatus::Healthy,
            message: None,
        },
        Ok(Err(err)) => {
            warn!(error = %huachuca_observability::redact(&err.to_string()), "session store health check failed");
            HealthCheck {
                name: "session_store",
                status: HealthStatus::Unhealthy,
                message: Some("unreachable".to_string()),
            }
        }
        Err(_) => HealthCheck {
            name: "session_store",
            status: HealthStatus::Unhealthy,
            message: Some("timed out".to_string()),
        },
    };

    let checks = vec![session_store];
    let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks,
            check_time: Utc::now(),
        }),
    )
}

/// GET /whoami
pub async fn whoami(
    State(state): State<AppState>,
    Extension(ctx): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let principal = ctx.principal();
    Json(serde_json::json!({
        "user_id": principal.id,
        "organization_id": principal.organization_id,
        "email": principal.email,
        "name": principal.name,
        "role": principal.role,
        "permissions": state.permissions.effective(principal),
    }))
}
