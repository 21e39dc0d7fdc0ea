//! Refresh sessions: one hashed, rotating secret per principal.
//!
//! Only the SHA-256 hash of a secret is ever persisted. Creating a session for a
//! principal replaces any previous one, and rotating consumes the presented
//! secret, so a secret works at most once.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, instrument};

use huachuca_core::{AuthError, SessionId, UserId};

use crate::{Principal, StoreError, UserDirectory};

pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
pub const REFRESH_SECRET_BYTES: usize = 32;

/// A persisted refresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: SessionId,
    pub user_id: UserId,
    /// Hex-encoded SHA-256 of the plaintext secret.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshSession {
    pub fn new(user_id: UserId, token_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            token_hash,
            expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Durable storage for refresh sessions.
///
/// Every mutating operation (and `find_by_hash`) first sweeps expired rows on a
/// best-effort basis: a failing sweep is logged and must not fail the call.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Atomically delete any session of `session.user_id` and insert `session`.
    async fn replace(&self, session: RefreshSession) -> Result<(), StoreError>;

    async fn find_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError>;

    /// Atomically remove the session matching `token_hash` and, if it was still
    /// live at `now`, insert a replacement for the same user with `new_hash`.
    ///
    /// Returns the consumed session. Of two concurrent calls with the same
    /// hash, at most one observes `Some`.
    async fn rotate(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError>;

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError>;

    async fn delete_for_user(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Remove every session expired at `now`, returning how many went.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Reachability check used by health checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn replace(&self, session: RefreshSession) -> Result<(), StoreError> {
        (**self).replace(session).await
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        (**self).find_by_hash(token_hash, now).await
    }

    async fn rotate(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        (**self).rotate(token_hash, new_hash, now).await
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        (**self).delete_by_hash(token_hash).await
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        (**self).delete_for_user(user_id).await
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        (**self).sweep_expired(now).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("refresh token not found")]
    NotFound,

    #[error("refresh token expired")]
    Expired,

    #[error("refresh token owner no longer exists")]
    UnknownUser,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RefreshError> for AuthError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::NotFound | RefreshError::Expired | RefreshError::UnknownUser => {
                AuthError::Unauthenticated
            }
            RefreshError::Store(e) => e.into(),
        }
    }
}

/// Generate a fresh plaintext refresh secret (32 random bytes, URL-safe base64).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a plaintext secret.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Refresh-session operations over a [`SessionStore`] and a [`UserDirectory`].
#[derive(Clone)]
pub struct RefreshSessions {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
}

impl RefreshSessions {
    pub fn new(store: Arc<dyn SessionStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { store, users }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a session for `user_id`, invalidating any previous one.
    pub async fn create(&self, user_id: UserId) -> Result<String, RefreshError> {
        self.create_at(user_id, Utc::now()).await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn create_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, RefreshError> {
        let secret = generate_secret();
        self.store
            .replace(RefreshSession::new(user_id, hash_secret(&secret), now))
            .await?;
        debug!("refresh session created");
        Ok(secret)
    }

    pub async fn validate(&self, secret: &str) -> Result<Principal, RefreshError> {
        self.validate_at(secret, Utc::now()).await
    }

    #[instrument(skip_all, err)]
    pub async fn validate_at(&self, secret: &str, now: DateTime<Utc>) -> Result<Principal, RefreshError> {
        let hash = hash_secret(secret);
        let session = self
            .store
            .find_by_hash(&hash, now)
            .await?
            .ok_or(RefreshError::NotFound)?;

        if session.is_expired_at(now) {
            self.store.delete_by_hash(&hash).await?;
            return Err(RefreshError::Expired);
        }

        self.load_user(session.user_id).await
    }

    /// Consume `secret` and issue its replacement.
    pub async fn rotate(&self, secret: &str) -> Result<(String, Principal), RefreshError> {
        self.rotate_at(secret, Utc::now()).await
    }

    #[instrument(skip_all, err)]
    pub async fn rotate_at(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, Principal), RefreshError> {
        let next = generate_secret();
        let consumed = self
            .store
            .rotate(&hash_secret(secret), &hash_secret(&next), now)
            .await?
            .ok_or(RefreshError::NotFound)?;

        if consumed.is_expired_at(now) {
            return Err(RefreshError::Expired);
        }

        let principal = match self.load_user(consumed.user_id).await {
            Ok(p) => p,
            Err(err) => {
                // Don't leave a live session behind for a principal we can't serve.
                self.store.delete_for_user(consumed.user_id).await?;
                return Err(err);
            }
        };
        debug!(user_id = %principal.id, "refresh session rotated");
        Ok((next, principal))
    }

    /// Drop the session of `user_id`, if any.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn revoke(&self, user_id: UserId) -> Result<(), RefreshError> {
        self.store.delete_for_user(user_id).await?;
        Ok(())
    }

    /// Drop the session holding `secret`, if any.
    #[instrument(skip_all, err)]
    pub async fn revoke_secret(&self, secret: &str) -> Result<(), RefreshError> {
        self.store.delete_by_hash(&hash_secret(secret)).await?;
        Ok(())
    }

    pub async fn sweep_expired(&self) -> Result<u64, RefreshError> {
        Ok(self.store.sweep_expired(Utc::now()).await?)
    }

    async fn load_user(&self, user_id: UserId) -> Result<Principal, RefreshError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(RefreshError::UnknownUser)
    }
}
