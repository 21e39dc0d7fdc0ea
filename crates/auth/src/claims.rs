use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use huachuca_core::{OrganizationId, UserId};

use crate::{Principal, Role};

/// Fixed access-token lifetime.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Access-token claim set.
///
/// External verifiers depend on exactly this shape (plus the published JWKS),
/// so field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: Role,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub nbf: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

impl AccessClaims {
    /// Claims for `principal` issued at `now` (truncated to whole seconds, the
    /// resolution of JWT NumericDate).
    pub fn for_principal(principal: &Principal, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(0);
        Self {
            user_id: principal.id,
            organization_id: principal.organization_id,
            role: principal.role,
            iat: now,
            nbf: now,
            exp: now + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the temporal claims against `now`.
///
/// Signature verification happens before this, in the token service.
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.nbf {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
