//! Adapter selection: in-memory maps for dev/test, Postgres when configured.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use huachuca_auth::{SessionStore, TokenService, UserDirectory};
use huachuca_infra::postgres;
use huachuca_infra::{
    InMemorySessionStore, InMemoryUserDirectory, PostgresSessionStore, PostgresUserDirectory,
};

use crate::app::{AppState, LoginSettings};
use crate::config::AppConfig;

/// Construct the application state described by `config`.
///
/// Generates the process signing key; every access token issued by a previous
/// process stops verifying.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let tokens = Arc::new(TokenService::generate().context("failed to generate signing key")?);

    let (sessions, users): (Arc<dyn SessionStore>, Arc<dyn UserDirectory>) =
        if config.use_persistent_stores {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for persistent stores")?;
            let pool = postgres::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            postgres::ensure_schema(&pool)
                .await
                .context("failed to apply schema")?;

            info!("using Postgres session store and user directory");
            (
                Arc::new(PostgresSessionStore::new(pool.clone())),
                Arc::new(PostgresUserDirectory::new(pool)),
            )
        } else {
            info!("using in-memory session store and user directory");
            (
                Arc::new(InMemorySessionStore::new()),
                Arc::new(InMemoryUserDirectory::new()),
            )
        };

    Ok(AppState::new(tokens, sessions, users).with_login_settings(LoginSettings {
        state_ttl: config.oauth_state_ttl,
        auto_provision_owners: config.auto_provision_owners,
    }))
}
