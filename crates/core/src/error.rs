//! Error taxonomy surfaced by the auth core.

use thiserror::Error;

/// Result type used across the auth core.
pub type AuthResult<T> = Result<T, AuthError>;

/// Caller-facing error taxonomy.
///
/// Component errors (token, refresh session, authorization, store) convert into
/// this enum. Semantic failures are never retried; `Transient` is the only
/// variant a caller may reasonably retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, invalid or expired access token or refresh secret.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Authenticated, but lacking a permission or acting on another organization.
    #[error("forbidden")]
    Forbidden,

    /// The principal behind a valid credential no longer exists.
    #[error("not found")]
    NotFound,

    /// A uniqueness rule in a collaborator was violated (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Durable-store I/O failed; the operation may be retried.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Key material or signing failed. Never caused by caller input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for the variants that mean "who are you?" rather than "not allowed".
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::NotFound)
    }
}
