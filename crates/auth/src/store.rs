use thiserror::Error;

use huachuca_core::AuthError;

/// Failure reported by a durable collaborator (session store, user directory).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or the operation failed mid-flight.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The row the write depends on does not exist.
    #[error("not found: {0}")]
    Missing(String),

    /// A per-organization quota rejected the write.
    #[error("limit reached: {0}")]
    LimitReached(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AuthError::Transient(msg),
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            StoreError::Corrupt(msg) => AuthError::Internal(msg),
            StoreError::Missing(_) => AuthError::NotFound,
            StoreError::LimitReached(_) => AuthError::Forbidden,
        }
    }
}
