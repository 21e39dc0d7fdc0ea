//! Postgres adapters for refresh sessions and the user directory.
//!
//! Each sweep-then-mutate sequence runs in one transaction. The sweep itself
//! runs in a savepoint: if it fails, only the savepoint is rolled back and the
//! primary statement still goes ahead.
//!
//! Tables are described in `sql/schema.sql`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};

use huachuca_auth::{
    Organization, Principal, RefreshSession, Role, SessionStore, StoreError, UserDirectory,
};
use huachuca_core::{OrganizationId, SessionId, UserId};

pub const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Open a pool against `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Apply `sql/schema.sql`. Safe to call on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: Arc<PgPool>,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

/// Delete expired sessions inside a savepoint of `tx`, logging instead of
/// failing.
async fn sweep_in_savepoint(tx: &mut Transaction<'static, Postgres>, now: DateTime<Utc>) {
    let outcome = async {
        let mut savepoint = tx.begin().await?;
        let swept = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *savepoint)
            .await?
            .rows_affected();
        savepoint.commit().await?;
        Ok::<_, sqlx::Error>(swept)
    }
    .await;

    match outcome {
        Ok(0) => {}
        Ok(swept) => debug!(swept, "expired refresh sessions removed"),
        Err(err) => warn!(error = %err, "refresh session sweep failed; continuing"),
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id), err)]
    async fn replace(&self, session: RefreshSession) -> Result<(), StoreError> {
        let mut tx = self.begin("replace").await?;
        sweep_in_savepoint(&mut tx, session.created_at).await;

        upsert_session(&mut tx, &session).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip_all, err)]
    async fn find_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut tx = self.begin("find_by_hash").await?;
        sweep_in_savepoint(&mut tx, now).await;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_by_hash", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        row.map(|r| session_from_row(&r)).transpose()
    }

    #[instrument(skip_all, err)]
    async fn rotate(
        &self,
        token_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut tx = self.begin("rotate").await?;
        sweep_in_savepoint(&mut tx, now).await;

        // The row lock taken by DELETE serializes concurrent rotations of the
        // same secret: the loser finds nothing once the winner commits.
        let row = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("consume_session", e))?;

        let Some(row) = row else {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            return Ok(None);
        };
        let consumed = session_from_row(&row)?;

        if !consumed.is_expired_at(now) {
            let next = RefreshSession::new(consumed.user_id, new_hash.to_string(), now);
            upsert_session(&mut tx, &next).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(consumed))
    }

    #[instrument(skip_all, err)]
    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_by_hash", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn delete_for_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_for_user", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("sweep_expired", e))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

/// Make `session` the user's only session.
///
/// Concurrent writers for one user queue on the `user_id` unique index and the
/// last to commit wins; none of them fails.
async fn upsert_session(
    tx: &mut Transaction<'static, Postgres>,
    session: &RefreshSession,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
        SET id = EXCLUDED.id,
            token_hash = EXCLUDED.token_hash,
            expires_at = EXCLUDED.expires_at,
            created_at = EXCLUDED.created_at
        "#,
    )
    .bind(session.id.as_uuid())
    .bind(session.user_id.as_uuid())
    .bind(&session.token_hash)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_session", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: Arc<PgPool>,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert `principal`, creating its organization row if missing.
    #[instrument(skip(self, principal), fields(user_id = %principal.id), err)]
    pub async fn insert(&self, principal: &Principal) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("INSERT INTO organizations (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(principal.organization_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_organization", e))?;

        insert_user(&mut tx, principal).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

const USER_COLUMNS: &str = "id, organization_id, email, name, role, permissions, created_at";

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_id", e))?;
        row.map(|r| principal_from_row(&r)).transpose()
    }

    #[instrument(skip_all, err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.map(|r| principal_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn list_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Principal>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 ORDER BY created_at, email"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;

        rows.iter().map(principal_from_row).collect()
    }

    #[instrument(skip(self, owner_email, owner_name), err)]
    async fn create_organization(
        &self,
        name: &str,
        owner_email: &str,
        owner_name: &str,
    ) -> Result<(Organization, Principal), StoreError> {
        let mut organization = Organization::new(name);
        let owner = Principal::new(organization.id, owner_email, Role::Owner).with_name(owner_name);
        organization.owner_id = Some(owner.id);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        ensure_email_free(&mut tx, owner_email).await?;

        let max_sub_accounts = i32::try_from(organization.max_sub_accounts)
            .map_err(|e| StoreError::Corrupt(format!("max_sub_accounts: {e}")))?;
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO organizations (id, name, subscription_tier, max_sub_accounts)
            VALUES ($1, $2, $3, $4)
            RETURNING created_at
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(&organization.subscription_tier)
        .bind(max_sub_accounts)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_organization", e))?;
        organization.created_at = created_at;

        insert_user(&mut tx, &owner).await?;

        sqlx::query("UPDATE organizations SET owner_id = $1 WHERE id = $2")
            .bind(owner.id.as_uuid())
            .bind(organization.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_organization_owner", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((organization, owner))
    }

    #[instrument(skip(self, email, name), fields(organization_id = %organization_id), err)]
    async fn add_user(
        &self,
        organization_id: OrganizationId,
        email: &str,
        name: &str,
    ) -> Result<Principal, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        ensure_email_free(&mut tx, email).await?;

        // Locking the organization row serializes concurrent adds, so the
        // count below cannot go stale before the insert.
        let limit: Option<i32> = sqlx::query_scalar(
            "SELECT max_sub_accounts FROM organizations WHERE id = $1 FOR UPDATE",
        )
        .bind(organization_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_organization", e))?;
        let limit =
            limit.ok_or_else(|| StoreError::Missing(format!("organization {organization_id}")))?;

        let sub_accounts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE organization_id = $1 AND role = 'sub_account'",
        )
        .bind(organization_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("count_sub_accounts", e))?;

        if sub_accounts >= i64::from(limit) {
            return Err(StoreError::LimitReached(format!(
                "organization {organization_id} already has {sub_accounts} sub-accounts"
            )));
        }

        let member = Principal::new(organization_id, email, Role::SubAccount).with_name(name);
        insert_user(&mut tx, &member).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(member)
    }
}

async fn ensure_email_free(
    tx: &mut Transaction<'static, Postgres>,
    email: &str,
) -> Result<(), StoreError> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_email", e))?;
    if taken {
        return Err(StoreError::Conflict(format!("email already registered: {email}")));
    }
    Ok(())
}

async fn insert_user(
    tx: &mut Transaction<'static, Postgres>,
    principal: &Principal,
) -> Result<(), StoreError> {
    let overrides: Vec<String> = principal.overrides.iter().cloned().collect();
    sqlx::query(
        r#"
        INSERT INTO users (id, organization_id, email, name, role, permissions, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(principal.id.as_uuid())
    .bind(principal.organization_id.as_uuid())
    .bind(&principal.email)
    .bind(&principal.name)
    .bind(principal.role.as_str())
    .bind(overrides)
    .bind(principal.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_user", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rows and errors
// ─────────────────────────────────────────────────────────────────────────────

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[derive(Debug)]
struct SessionRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SessionRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token_hash: row.try_get("token_hash")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        RefreshSession {
            id: SessionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

fn session_from_row(row: &PgRow) -> Result<RefreshSession, StoreError> {
    SessionRow::from_row(row)
        .map(Into::into)
        .map_err(|e| map_sqlx_error("decode_session", e))
}

#[derive(Debug)]
struct UserRow {
    id: uuid::Uuid,
    organization_id: uuid::Uuid,
    email: String,
    name: String,
    role: String,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            role: row.try_get("role")?,
            permissions: row.try_get("permissions")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<UserRow> for Principal {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {}", row.id, e)))?;
        Ok(Principal {
            id: UserId::from_uuid(row.id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            email: row.email,
            name: row.name,
            role,
            overrides: row.permissions.into_iter().collect(),
            created_at: row.created_at,
        })
    }
}

fn principal_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    UserRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_user", e))?
        .try_into()
}
