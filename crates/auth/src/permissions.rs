use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capability a principal may hold.
///
/// The set is closed: role defaults only ever grant these. Per-principal
/// overrides are stored as free-form strings and match a permission by its
/// wire name (see [`Permission::as_str`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "create:org")]
    CreateOrganization,
    #[serde(rename = "read:org")]
    ReadOrganization,
    #[serde(rename = "update:org")]
    UpdateOrganization,
    #[serde(rename = "delete:org")]
    DeleteOrganization,
    #[serde(rename = "invite:user")]
    InviteUser,
    #[serde(rename = "remove:user")]
    RemoveUser,
    #[serde(rename = "update:user")]
    UpdateUser,
    #[serde(rename = "manage:settings")]
    ManageSettings,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::CreateOrganization,
        Permission::ReadOrganization,
        Permission::UpdateOrganization,
        Permission::DeleteOrganization,
        Permission::InviteUser,
        Permission::RemoveUser,
        Permission::UpdateUser,
        Permission::ManageSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CreateOrganization => "create:org",
            Permission::ReadOrganization => "read:org",
            Permission::UpdateOrganization => "update:org",
            Permission::DeleteOrganization => "delete:org",
            Permission::InviteUser => "invite:user",
            Permission::RemoveUser => "remove:user",
            Permission::UpdateUser => "update:user",
            Permission::ManageSettings => "manage:settings",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}
