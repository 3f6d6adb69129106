//! SQL text for provisioning statements.
//!
//! PostgreSQL does not accept bind parameters in utility statements
//! (`CREATE DATABASE`, `CREATE USER`, `GRANT`), so names are validated by the
//! newtypes in `types::names` and always emitted as quoted identifiers, and
//! passwords are emitted as quoted literals. The catalog query is bound.

use crate::db::credential::Secret;
use crate::types::{DatabaseName, GroupRole, RoleGroups, RoleName};

/// Databases owned by `$1`, excluding the control database `$2`.
pub const MANAGED_DATABASES: &str = r#"
SELECT d.datname::text
FROM pg_database d
JOIN pg_roles r ON d.datdba = r.oid
WHERE r.rolname::text = $1 AND d.datname::text <> $2
ORDER BY d.datname
"#;

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn create_database(name: &DatabaseName, owner: &str) -> String {
    format!(
        "CREATE DATABASE {} WITH OWNER {}",
        quote_ident(name.as_str()),
        quote_ident(owner)
    )
}

pub fn drop_database(name: &DatabaseName) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_ident(name.as_str()))
}

/// Contains the password; never log the result.
pub fn create_login_role(user: &RoleName, password: &Secret) -> String {
    format!(
        "CREATE USER {} WITH LOGIN ENCRYPTED PASSWORD {}",
        quote_ident(user.as_str()),
        quote_literal(password.expose())
    )
}

pub fn grant_group(group: &str, user: &RoleName) -> String {
    format!("GRANT {} TO {}", quote_ident(group), quote_ident(user.as_str()))
}

/// Recreates both role groups of a database.
pub fn role_group_preamble(groups: &RoleGroups) -> String {
    GroupRole::ALL
        .iter()
        .map(|role| {
            let group = quote_ident(groups.get(*role));
            format!("drop user if exists {group};\ncreate user {group};\n")
        })
        .collect()
}
