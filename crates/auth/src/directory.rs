//! Collaborator seams the core consumes but does not implement.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use huachuca_core::{AuthError, OrganizationId, UserId};

use crate::{Principal, StoreError};

pub const DEFAULT_SUBSCRIPTION_TIER: &str = "free";
pub const DEFAULT_MAX_SUB_ACCOUNTS: u32 = 5;

/// The multi-tenant boundary every principal belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// Unset only for organizations created implicitly by seeding a member.
    pub owner_id: Option<UserId>,
    pub subscription_tier: String,
    /// Upper bound on `sub_account` members.
    pub max_sub_accounts: u32,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OrganizationId::new(),
            name: name.into(),
            owner_id: None,
            subscription_tier: DEFAULT_SUBSCRIPTION_TIER.to_string(),
            max_sub_accounts: DEFAULT_MAX_SUB_ACCOUNTS,
            created_at: Utc::now(),
        }
    }
}

/// Read access to principals, plus organization and membership writes.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;

    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Principal>, StoreError>;

    /// Create an organization named `name` owned by a new `owner` principal.
    ///
    /// Fails with [`StoreError::Conflict`] if `owner_email` is already taken.
    async fn create_organization(
        &self,
        name: &str,
        owner_email: &str,
        owner_name: &str,
    ) -> Result<(Organization, Principal), StoreError>;

    /// Add a `sub_account` member to an existing organization.
    ///
    /// Email uniqueness is checked before the quota: a taken email is
    /// [`StoreError::Conflict`], a full organization [`StoreError::LimitReached`],
    /// an unknown one [`StoreError::Missing`].
    async fn add_user(
        &self,
        organization_id: OrganizationId,
        email: &str,
        name: &str,
    ) -> Result<Principal, StoreError>;

    /// First-login provisioning: a fresh organization named after its owner.
    async fn provision_owner(&self, email: &str, name: &str) -> Result<Principal, StoreError> {
        let (_, owner) = self.create_organization(name, email, name).await?;
        Ok(owner)
    }
}

#[async_trait]
impl<D> UserDirectory for Arc<D>
where
    D: UserDirectory + ?Sized,
{
    async fn find_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Principal>, StoreError> {
        (**self).list_by_organization(organization_id).await
    }

    async fn create_organization(
        &self,
        name: &str,
        owner_email: &str,
        owner_name: &str,
    ) -> Result<(Organization, Principal), StoreError> {
        (**self).create_organization(name, owner_email, owner_name).await
    }

    async fn add_user(
        &self,
        organization_id: OrganizationId,
        email: &str,
        name: &str,
    ) -> Result<Principal, StoreError> {
        (**self).add_user(organization_id, email, name).await
    }

    async fn provision_owner(&self, email: &str, name: &str) -> Result<Principal, StoreError> {
        (**self).provision_owner(email, name).await
    }
}

/// Identity asserted by the external OAuth provider after a code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub email: String,
    pub name: String,
}

/// OAuth provider integration (authorization URL + code exchange).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, AuthError>;
}
