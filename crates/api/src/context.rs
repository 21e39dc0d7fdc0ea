use huachuca_auth::Principal;
use huachuca_core::OrganizationId;

/// The authenticated principal, inserted by the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.principal.organization_id
    }
}

/// Organization named by the `/organizations/{id}` path segment.
///
/// Inserted before authentication so a malformed ID is rejected up front.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TargetOrganization(pub OrganizationId);

impl TargetOrganization {
    pub fn id(&self) -> OrganizationId {
        self.0
    }
}
