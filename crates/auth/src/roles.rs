use std::collections::{HashMap, HashSet};

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::Permission;

/// Coarse permission bundle assigned to a principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    SubAccount,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Owner, Role::Admin, Role::SubAccount];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::SubAccount => "sub_account",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Immutable role → default-permission mapping.
///
/// Built once at startup and shared by reference; there is no mutation API.
#[derive(Debug, Clone)]
pub struct RoleTable {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl RoleTable {
    /// The production table: owners hold everything, admins everything except
    /// creating/deleting organizations, sub-accounts may only read.
    pub fn standard() -> Self {
        use Permission::*;

        let mut grants = HashMap::new();
        grants.insert(Role::Owner, Permission::ALL.into_iter().collect());
        grants.insert(
            Role::Admin,
            [
                ReadOrganization,
                UpdateOrganization,
                InviteUser,
                RemoveUser,
                UpdateUser,
                ManageSettings,
            ]
            .into_iter()
            .collect(),
        );
        grants.insert(Role::SubAccount, [ReadOrganization].into_iter().collect());

        Self { grants }
    }

    pub fn from_grants(grants: impl IntoIterator<Item = (Role, Vec<Permission>)>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|(role, perms)| (role, perms.into_iter().collect()))
                .collect(),
        }
    }

    pub fn grants(&self, role: Role, permission: Permission) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|perms| perms.contains(&permission))
    }

    /// Default permissions of `role`, sorted for stable output.
    pub fn permissions_of(&self, role: Role) -> Vec<Permission> {
        let mut perms: Vec<Permission> = self
            .grants
            .get(&role)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        perms.sort();
        perms
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::standard()
    }
}
