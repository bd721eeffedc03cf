/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role as persisted in the `profiles.role` column.
/// The serialized tokens are a storage contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Landlord,
    #[default]
    Tenant,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::SuperAdmin, Role::Landlord, Role::Tenant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Landlord => "landlord",
            Role::Tenant => "tenant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Mutually exclusive role flags derived from the committed user.
/// All false while no user is committed (anonymous or loading).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoleFlags {
    pub is_admin: bool,
    pub is_landlord: bool,
    pub is_tenant: bool,
}

impl RoleFlags {
    pub fn from_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::SuperAdmin) => Self { is_admin: true, ..Self::default() },
            Some(Role::Landlord) => Self { is_landlord: true, ..Self::default() },
            Some(Role::Tenant) => Self { is_tenant: true, ..Self::default() },
            None => Self::default(),
        }
    }

    /// The role these flags were derived from, if any
    pub fn role(&self) -> Option<Role> {
        if self.is_admin {
            Some(Role::SuperAdmin)
        } else if self.is_landlord {
            Some(Role::Landlord)
        } else if self.is_tenant {
            Some(Role::Tenant)
        } else {
            None
        }
    }

    pub fn satisfies(&self, required: Role) -> bool {
        self.role() == Some(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tokens_are_stable() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super_admin\"");
        assert_eq!(serde_json::to_string(&Role::Landlord).unwrap(), "\"landlord\"");
        assert_eq!(serde_json::to_string(&Role::Tenant).unwrap(), "\"tenant\"");
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn exactly_one_flag_per_role() {
        for role in Role::ALL {
            let flags = RoleFlags::from_role(Some(role));
            let set = [flags.is_admin, flags.is_landlord, flags.is_tenant]
                .iter()
                .filter(|f| **f)
                .count();
            assert_eq!(set, 1, "role {} should set exactly one flag", role);
            assert_eq!(flags.role(), Some(role));
        }
    }

    #[test]
    fn no_role_means_no_flags() {
        let flags = RoleFlags::from_role(None);
        assert!(!flags.is_admin && !flags.is_landlord && !flags.is_tenant);
        assert!(!flags.satisfies(Role::Tenant));
    }
}
