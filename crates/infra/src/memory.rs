//! In-memory adapters for tests and single-node development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use huachuca_auth::{
    Organization, Principal, RefreshSession, Role, SessionStore, StoreError, UserDirectory,
};
use huachuca_core::{OrganizationId, UserId};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// Refresh sessions keyed by secret hash.
///
/// One lock covers the whole map, so sweep-then-mutate sequences are atomic.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, RefreshSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().map_err(|_| poisoned())?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn sweep(map: &mut HashMap<String, RefreshSession>, now: DateTime<Utc>) -> u64 {
    let before = map.len();
    map.retain(|_, s| !s.is_expired_at(now));
    let swept = (before - map.len()) as u64;
    if swept > 0 {
        debug!(swept, "expired refresh sessions removed");
    }
    swept
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn replace(&self, session: RefreshSession) -> Result<(), StoreError> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        sweep(&mut map, session.created_at);
        map.retain(|_, s| s.user_id != session.user_id);
        map.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        sweep(&mut map, now);
        Ok(map.get(token_hash).cloned())
    }

    async fn rotate(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        sweep(&mut map, now);

        let Some(consumed) = map.remove(token_hash) else {
            return Ok(None);
        };
        if !consumed.is_expired_at(now) {
            map.retain(|_, s| s.user_id != consumed.user_id);
            let next = RefreshSession::new(consumed.user_id, new_hash.to_string(), now);
            map.insert(next.token_hash.clone(), next);
        }
        Ok(Some(consumed))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        Ok(map.remove(token_hash).is_some())
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        let before = map.len();
        map.retain(|_, s| s.user_id != user_id);
        Ok(map.len() < before)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        Ok(sweep(&mut map, now))
    }
}

#[derive(Debug, Default)]
struct Directory {
    users: HashMap<UserId, Principal>,
    organizations: HashMap<OrganizationId, Organization>,
}

impl Directory {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

fn email_conflict(email: &str) -> StoreError {
    StoreError::Conflict(format!("email already registered: {email}"))
}

/// Principals and organizations behind one lock, so membership checks and the
/// write they guard are atomic. Email uniqueness is enforced on every write.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    inner: RwLock<Directory>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `principal`, creating a default organization row if missing.
    pub fn insert(&self, principal: Principal) -> Result<(), StoreError> {
        let mut dir = self.inner.write().map_err(|_| poisoned())?;
        if dir.email_taken(&principal.email, Some(principal.id)) {
            return Err(email_conflict(&principal.email));
        }
        dir.organizations
            .entry(principal.organization_id)
            .or_insert_with(|| Organization {
                id: principal.organization_id,
                ..Organization::new("")
            });
        dir.users.insert(principal.id, principal);
        Ok(())
    }

    pub fn organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        let dir = self.inner.read().map_err(|_| poisoned())?;
        Ok(dir.organizations.get(&id).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        let dir = self.inner.read().map_err(|_| poisoned())?;
        Ok(dir.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let dir = self.inner.read().map_err(|_| poisoned())?;
        Ok(dir.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Principal>, StoreError> {
        let dir = self.inner.read().map_err(|_| poisoned())?;
        let mut members: Vec<Principal> = dir
            .users
            .values()
            .filter(|u| u.belongs_to(organization_id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(members)
    }

    async fn create_organization(
        &self,
        name: &str,
        owner_email: &str,
        owner_name: &str,
    ) -> Result<(Organization, Principal), StoreError> {
        let mut dir = self.inner.write().map_err(|_| poisoned())?;
        if dir.email_taken(owner_email, None) {
            return Err(email_conflict(owner_email));
        }

        let mut organization = Organization::new(name);
        let owner = Principal::new(organization.id, owner_email, Role::Owner).with_name(owner_name);
        organization.owner_id = Some(owner.id);

        dir.organizations.insert(organization.id, organization.clone());
        dir.users.insert(owner.id, owner.clone());
        Ok((organization, owner))
    }

    async fn add_user(
        &self,
        organization_id: OrganizationId,
        email: &str,
        name: &str,
    ) -> Result<Principal, StoreError> {
        let mut dir = self.inner.write().map_err(|_| poisoned())?;
        if dir.email_taken(email, None) {
            return Err(email_conflict(email));
        }

        let limit = dir
            .organizations
            .get(&organization_id)
            .map(|o| o.max_sub_accounts)
            .ok_or_else(|| StoreError::Missing(format!("organization {organization_id}")))?;
        let sub_accounts = dir
            .users
            .values()
            .filter(|u| u.belongs_to(organization_id) && u.role == Role::SubAccount)
            .count();
        if sub_accounts >= limit as usize {
            return Err(StoreError::LimitReached(format!(
                "organization {organization_id} already has {sub_accounts} sub-accounts"
            )));
        }

        let member = Principal::new(organization_id, email, Role::SubAccount).with_name(name);
        dir.users.insert(member.id, member.clone());
        Ok(member)
    }
}
