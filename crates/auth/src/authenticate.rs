use std::sync::Arc;

use tracing::debug;

use huachuca_core::AuthError;

use crate::{Principal, TokenService, UserDirectory};

/// Extract the token from an `Authorization` header value.
///
/// Accepts exactly `Bearer <token>`: two parts separated by one space, with a
/// case-sensitive scheme.
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Turns an `Authorization` header into a loaded principal.
///
/// Every failure collapses to [`AuthError::Unauthenticated`] except directory
/// outages, which surface as [`AuthError::Transient`].
#[derive(Clone)]
pub struct Authenticator {
    tokens: Arc<TokenService>,
    users: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>, users: Arc<dyn UserDirectory>) -> Self {
        Self { tokens, users }
    }

    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::Unauthenticated)?;

        let claims = self.tokens.verify(token).map_err(|err| {
            debug!(error = %err, "access token rejected");
            AuthError::Unauthenticated
        })?;

        let principal = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        // The directory is authoritative; a token minted before the principal
        // moved organization must not carry the old scope.
        if principal.organization_id != claims.organization_id {
            debug!(user_id = %principal.id, "token organization is stale");
            return Err(AuthError::Unauthenticated);
        }

        Ok(principal)
    }
}
