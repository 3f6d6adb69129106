//! Request and response bodies of the administrative HTTP API.
//!
//! Names arrive as plain strings and are parsed by the handlers, so an invalid
//! name is reported like any other `ProvisionError`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct DatabaseList {
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDatabaseBody {
    pub name: String,
    #[serde(default)]
    pub demo_user: bool,
    #[serde(default)]
    pub fuzzymatch: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub username: String,
    /// Present only when the server generated the password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantBody {
    pub database: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub client: bool,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub grants: usize,
}
