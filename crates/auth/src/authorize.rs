use thiserror::Error;

use huachuca_core::{AuthError, OrganizationId};

use crate::{Permission, Principal, RoleTable};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("organization mismatch")]
    OrganizationMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for AuthError {
    fn from(_: AuthzError) -> Self {
        AuthError::Forbidden
    }
}

/// How a set of required permissions is combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Every listed permission must resolve.
    All(Vec<Permission>),
    /// At least one listed permission must resolve.
    Any(Vec<Permission>),
}

impl Requirement {
    pub fn all(perms: impl IntoIterator<Item = Permission>) -> Self {
        Self::All(perms.into_iter().collect())
    }

    pub fn any(perms: impl IntoIterator<Item = Permission>) -> Self {
        Self::Any(perms.into_iter().collect())
    }

    pub fn permissions(&self) -> &[Permission] {
        match self {
            Requirement::All(p) | Requirement::Any(p) => p,
        }
    }
}

/// Two-tier permission resolution: role defaults plus additive overrides.
///
/// - No IO
/// - No panics
#[derive(Debug, Clone, Default)]
pub struct PermissionModel {
    roles: RoleTable,
}

impl PermissionModel {
    pub fn new(roles: RoleTable) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn resolve(&self, principal: &Principal, permission: Permission) -> bool {
        self.roles.grants(principal.role, permission) || principal.has_override(permission)
    }

    pub fn resolve_any(&self, principal: &Principal, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.resolve(principal, *p))
    }

    pub fn resolve_all(&self, principal: &Principal, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.resolve(principal, *p))
    }

    /// Every permission the principal effectively holds, sorted.
    pub fn effective(&self, principal: &Principal) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.resolve(principal, *p))
            .collect()
    }

    /// Check a requirement, naming the first unmet permission on failure.
    pub fn check(&self, principal: &Principal, requirement: &Requirement) -> Result<(), AuthzError> {
        match requirement {
            Requirement::All(perms) => match perms.iter().find(|p| !self.resolve(principal, **p)) {
                None => Ok(()),
                Some(missing) => Err(AuthzError::Forbidden(missing.to_string())),
            },
            Requirement::Any(perms) => {
                if self.resolve_any(principal, perms) {
                    Ok(())
                } else {
                    let wanted: Vec<&str> = perms.iter().map(|p| p.as_str()).collect();
                    Err(AuthzError::Forbidden(wanted.join("|")))
                }
            }
        }
    }
}

/// Authorize a principal for a requirement, optionally scoped to an organization.
///
/// The organization check runs first so a cross-organization request is
/// rejected even when the principal holds the permission in its own one.
pub fn authorize(
    model: &PermissionModel,
    principal: &Principal,
    requirement: &Requirement,
    target_organization: Option<OrganizationId>,
) -> Result<(), AuthzError> {
    if let Some(target) = target_organization {
        if !principal.belongs_to(target) {
            return Err(AuthzError::OrganizationMismatch);
        }
    }
    model.check(principal, requirement)
}
