use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use huachuca_core::{OrganizationId, UserId};

use crate::{Permission, Role};

/// An authenticated actor as loaded from the user directory.
///
/// # Invariants
/// - Belongs to exactly one organization.
/// - `email` is unique across all principals (enforced by the directory).
/// - `overrides` only ever add capabilities on top of the role defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub overrides: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(organization_id: OrganizationId, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            organization_id,
            email: email.into(),
            name: String::new(),
            role,
            overrides: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_override(mut self, permission: impl Into<String>) -> Self {
        self.overrides.insert(permission.into());
        self
    }

    pub fn has_override(&self, permission: Permission) -> bool {
        self.overrides.contains(permission.as_str())
    }

    pub fn belongs_to(&self, organization_id: OrganizationId) -> bool {
        self.organization_id == organization_id
    }
}
