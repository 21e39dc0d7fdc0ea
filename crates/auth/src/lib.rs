//! `huachuca-auth`: token issuance, refresh sessions, OAuth state and the
//! permission model.
//!
//! Nothing here knows about HTTP or SQL. Durable state is reached through the
//! [`SessionStore`] and [`UserDirectory`] traits; adapters live in
//! `huachuca-infra`.

pub mod authenticate;
pub mod authorize;
pub mod claims;
pub mod directory;
pub mod oauth_state;
pub mod permissions;
pub mod principal;
pub mod refresh;
pub mod roles;
pub mod store;
pub mod token;

pub use authenticate::{bearer_token, Authenticator};
pub use authorize::{authorize, AuthzError, PermissionModel, Requirement};
pub use claims::{validate_claims, AccessClaims, TokenValidationError, ACCESS_TOKEN_TTL_SECS};
pub use directory::{ExternalIdentity, IdentityProvider, Organization, UserDirectory};
pub use oauth_state::{OAuthStateStore, SweeperHandle};
pub use permissions::Permission;
pub use principal::Principal;
pub use refresh::{
    generate_secret, hash_secret, RefreshError, RefreshSession, RefreshSessions, SessionStore,
};
pub use roles::{Role, RoleTable};
pub use store::StoreError;
pub use token::{Jwk, JwkSet, TokenError, TokenService};
