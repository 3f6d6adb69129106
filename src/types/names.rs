use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Longest database name whose derived role groups still fit in an identifier.
pub const MAX_DATABASE_NAME_LEN: usize = MAX_IDENTIFIER_LEN - "OMClientGroup_".len();

/// Lowercase identifiers only: `[a-z_][a-z0-9_]*`.
///
/// Keeping names lowercase means the uppercase template placeholders can never
/// occur inside a derived group name.
fn validate(kind: &'static str, raw: &str, max_len: usize) -> Result<(), ProvisionError> {
    let invalid = |reason| ProvisionError::InvalidName {
        kind,
        name: raw.to_string(),
        reason,
    };

    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return Err(invalid("must not be empty"));
    };
    if raw.len() > max_len {
        return Err(invalid("too long"));
    }
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err(invalid("must start with a lowercase letter or underscore"));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(invalid(
            "may only contain lowercase letters, digits and underscores",
        ));
    }
    Ok(())
}

/// Cluster databases that are never provisioned.
const SYSTEM_DATABASES: [&str; 3] = ["postgres", "template0", "template1"];

/// Name of a managed practice database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName(String);

impl DatabaseName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ProvisionError> {
        let raw = raw.into();
        validate("database", &raw, MAX_DATABASE_NAME_LEN)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Refuses the control database and the cluster's own databases.
    pub fn ensure_managed(&self, control_database: &str) -> Result<(), ProvisionError> {
        if self.0 == control_database || SYSTEM_DATABASES.contains(&self.0.as_str()) {
            return Err(ProvisionError::InvalidName {
                kind: "database",
                name: self.0.clone(),
                reason: "reserved, not a managed database",
            });
        }
        Ok(())
    }
}

/// Name of a login role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ProvisionError> {
        let raw = raw.into();
        validate("role", &raw, MAX_IDENTIFIER_LEN)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = ProvisionError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl FromStr for $ty {
            type Err = ProvisionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype_impls!(DatabaseName);
string_newtype_impls!(RoleName);

/// Permission tier scoped to one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    Admin,
    Client,
}

impl GroupRole {
    pub const ALL: [GroupRole; 2] = [GroupRole::Admin, GroupRole::Client];

    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Client => "Client",
        }
    }

    /// Token in the permissions script replaced by this tier's group name.
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN_GROUP",
            Self::Client => "CLIENT_GROUP",
        }
    }

    /// `OM<Role>Group_<dbname>`
    pub fn group_name(self, database: &DatabaseName) -> String {
        format!("OM{}Group_{}", self.label(), database.as_str())
    }
}

/// The two role groups derived from a database name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGroups {
    pub admin: String,
    pub client: String,
}

impl RoleGroups {
    pub fn for_database(database: &DatabaseName) -> Self {
        Self {
            admin: GroupRole::Admin.group_name(database),
            client: GroupRole::Client.group_name(database),
        }
    }

    pub fn get(&self, role: GroupRole) -> &str {
        match role {
            GroupRole::Admin => &self.admin,
            GroupRole::Client => &self.client,
        }
    }
}
