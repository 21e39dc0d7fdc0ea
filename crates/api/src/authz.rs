//! Authorization gates placed after authentication.
//!
//! A [`Gate`] combines a permission requirement with an optional
//! same-organization check and answers every denial with the same 403 body.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use huachuca_auth::{authorize, AuthzError, Permission, PermissionModel, Principal, Requirement};
use huachuca_core::OrganizationId;

use crate::app::errors::{forbidden, json_error, unauthorized};
use crate::context::{PrincipalContext, TargetOrganization};

#[derive(Debug, Clone)]
pub struct Gate {
    model: Arc<PermissionModel>,
    requirement: Requirement,
    same_organization: bool,
}

impl Gate {
    /// Every permission in `perms` must resolve.
    pub fn require_all(model: Arc<PermissionModel>, perms: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            model,
            requirement: Requirement::all(perms),
            same_organization: false,
        }
    }

    /// At least one permission in `perms` must resolve.
    pub fn require_any(model: Arc<PermissionModel>, perms: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            model,
            requirement: Requirement::any(perms),
            same_organization: false,
        }
    }

    /// Also require the principal to belong to the path's organization.
    pub fn same_organization(mut self) -> Self {
        self.same_organization = true;
        self
    }

    /// Decide a request already carrying a principal (and, when scoped, a
    /// target organization).
    pub fn check(
        &self,
        principal: &Principal,
        target: Option<TargetOrganization>,
    ) -> Result<(), AuthzError> {
        let target_organization = if self.same_organization {
            // A scoped gate mounted on a route without an organization segment
            // must not fail open.
            Some(target.ok_or(AuthzError::OrganizationMismatch)?.id())
        } else {
            None
        };
        authorize(&self.model, principal, &self.requirement, target_organization)
    }
}

/// Middleware form of [`Gate::check`].
pub async fn enforce(State(gate): State<Gate>, req: Request, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<PrincipalContext>() else {
        return unauthorized();
    };
    let target = req.extensions().get::<TargetOrganization>().copied();

    match gate.check(ctx.principal(), target) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            debug!(user_id = %ctx.principal().id, error = %err, "request denied");
            forbidden()
        }
    }
}

/// The `{id}` following an `organizations` segment, if present.
pub fn organization_segment(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == "organizations")?;
    segments.next()
}

/// Parse the organization ID out of the path before anything else runs.
///
/// A malformed ID is a client error (400) regardless of credentials.
pub async fn organization_scope(mut req: Request, next: Next) -> Response {
    let Some(raw) = organization_segment(req.uri().path()) else {
        return next.run(req).await;
    };

    match OrganizationId::from_str(raw) {
        Ok(id) => {
            req.extensions_mut().insert(TargetOrganization(id));
            next.run(req).await
        }
        Err(_) => json_error(
            StatusCode::BAD_REQUEST,
            "invalid_organization_id",
            "invalid organization ID format",
        ),
    }
}
