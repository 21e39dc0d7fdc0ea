//! HTTP application wiring (axum router + shared state).
//!
//! - `services.rs`: picks in-memory or Postgres adapters from config
//! - `routes/`: handlers, one file per area
//! - `errors.rs`: consistent error responses
//! - `validation.rs`: request field checks

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;

use huachuca_auth::{
    Authenticator, IdentityProvider, OAuthStateStore, PermissionModel, RefreshSessions,
    SessionStore, TokenService, UserDirectory,
};

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;
pub mod validation;

/// Login-flow knobs taken from [`crate::config::AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginSettings {
    pub state_ttl: Duration,
    pub auto_provision_owners: bool,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            state_ttl: huachuca_auth::oauth_state::DEFAULT_STATE_TTL,
            auto_provision_owners: false,
        }
    }
}

/// Everything a handler or gate needs, constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub sessions: RefreshSessions,
    pub users: Arc<dyn UserDirectory>,
    pub authenticator: Authenticator,
    pub permissions: Arc<PermissionModel>,
    pub oauth_states: Arc<OAuthStateStore>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub login: LoginSettings,
}

impl AppState {
    pub fn new(
        tokens: Arc<TokenService>,
        session_store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            authenticator: Authenticator::new(tokens.clone(), users.clone()),
            sessions: RefreshSessions::new(session_store, users.clone()),
            tokens,
            users,
            permissions: Arc::new(PermissionModel::default()),
            oauth_states: Arc::new(OAuthStateStore::new()),
            identity: None,
            login: LoginSettings::default(),
        }
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    pub fn with_login_settings(mut self, login: LoginSettings) -> Self {
        self.login = login;
        self
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(state: AppState) -> Router {
    routes::router(state.clone())
        .with_state(state)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_log)))
}
