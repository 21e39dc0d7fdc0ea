//! Organization creation and membership.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use huachuca_auth::{Organization, Principal, Role, StoreError};
use huachuca_core::{OrganizationId, UserId};

use crate::app::errors::{json_error, ApiError};
use crate::app::validation::{validate_email, validate_name, ValidationError};
use crate::app::AppState;
use crate::context::TargetOrganization;

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub owner_email: String,
    pub owner_name: String,
}

impl CreateOrganizationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("name", &self.name)?;
        validate_email("owner_email", &self.owner_email)?;
        validate_name("owner_name", &self.owner_name)
    }
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub email: String,
    pub name: String,
}

impl AddUserRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_email("email", &self.email)?;
        validate_name("name", &self.name)
    }
}

#[derive(Debug, Serialize)]
pub struct MemberDto {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Override grants on top of the role defaults.
    pub permissions: Vec<String>,
}

impl From<Principal> for MemberDto {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            email: p.email,
            name: p.name,
            role: p.role,
            permissions: p.overrides.into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedOrganization {
    pub organization: Organization,
    pub owner: MemberDto,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub organization_id: OrganizationId,
    pub users: Vec<MemberDto>,
}

/// GET /organizations/:organization_id/users (read:org, same organization)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(target): Extension<TargetOrganization>,
) -> Result<Json<MembersResponse>, ApiError> {
    let users = state.users.list_by_organization(target.id()).await?;
    Ok(Json(MembersResponse {
        organization_id: target.id(),
        users: users.into_iter().map(MemberDto::from).collect(),
    }))
}

fn invalid_body() -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_request", "invalid request body")
}

fn invalid_field(err: ValidationError) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_failed", err.to_string())
}

/// POST /organizations (create:org)
pub async fn create_organization(
    State(state): State<AppState>,
    body: Result<Json<CreateOrganizationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Ok(Json(body)) = body else {
        return Ok(invalid_body());
    };
    if let Err(err) = body.validate() {
        return Ok(invalid_field(err));
    }

    let (organization, owner) = state
        .users
        .create_organization(body.name.trim(), &body.owner_email, body.owner_name.trim())
        .await?;
    info!(organization_id = %organization.id, owner_id = %owner.id, "organization created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedOrganization {
            organization,
            owner: owner.into(),
        }),
    )
        .into_response())
}

/// POST /organizations/:organization_id/users (invite:user, same organization)
pub async fn add_user(
    State(state): State<AppState>,
    Extension(target): Extension<TargetOrganization>,
    body: Result<Json<AddUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Ok(Json(body)) = body else {
        return Ok(invalid_body());
    };
    if let Err(err) = body.validate() {
        return Ok(invalid_field(err));
    }

    let member = match state
        .users
        .add_user(target.id(), &body.email, body.name.trim())
        .await
    {
        Ok(member) => member,
        Err(StoreError::LimitReached(_)) => {
            return Ok(json_error(
                StatusCode::FORBIDDEN,
                "max_sub_accounts",
                "maximum sub-accounts reached",
            ));
        }
        Err(err) => return Err(err.into()),
    };
    info!(organization_id = %target.id(), user_id = %member.id, "user added");

    Ok((StatusCode::CREATED, Json(MemberDto::from(member))).into_response())
}
