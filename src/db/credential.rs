use crate::config::DatabaseConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use sqlx::postgres::PgConnectOptions;
use std::{fmt, fs};

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Strings only. A number would have lost its exact spelling (`007` vs `7`)
/// before reaching here.
impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self)
    }
}

/// Master connection parameters for the service account.
///
/// Built once at startup and shared read-only; the secret lives only here.
#[derive(Debug, Clone)]
pub struct MasterCredential {
    host: String,
    port: u16,
    service_account: String,
    secret: Secret,
}

impl MasterCredential {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        service_account: impl Into<String>,
        secret: Secret,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            service_account: service_account.into(),
            secret,
        }
    }

    /// Resolves the secret from `master_password`, falling back to
    /// `master_password_file` (trailing newline stripped).
    pub fn from_config(cfg: &DatabaseConfig) -> Result<Self, ConfigError> {
        let secret = if !cfg.master_password.is_empty() {
            cfg.master_password.clone()
        } else if let Some(path) = cfg.master_password_file.as_ref() {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::MasterPasswordFile {
                path: path.clone(),
                source,
            })?;
            Secret::new(raw.trim_end_matches(['\r', '\n']))
        } else {
            Secret::default()
        };
        if secret.is_empty() {
            return Err(ConfigError::Missing("database.master_password"));
        }
        Ok(Self::new(
            cfg.host.clone(),
            cfg.port,
            cfg.service_account.clone(),
            secret,
        ))
    }

    pub fn service_account(&self) -> &str {
        &self.service_account
    }

    /// Connection parameters targeting `database`.
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.service_account)
            .password(self.secret.expose())
            .database(database)
    }
}
