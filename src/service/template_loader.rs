use crate::config::SchemaConfig;
use crate::db::statements::{quote_ident, role_group_preamble};
use crate::error::ProvisionError;
use crate::types::{DatabaseName, GroupRole, RoleGroups};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Base schema and permissions script as read from disk.
#[derive(Debug, Clone)]
pub struct SchemaTemplate {
    base: String,
    permissions: String,
}

impl SchemaTemplate {
    pub fn new(base: impl Into<String>, permissions: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            permissions: permissions.into(),
        }
    }

    /// Base schema followed by the permissions script with each placeholder
    /// replaced by its quoted group name. Plain substring replacement.
    pub fn render_body(&self, groups: &RoleGroups) -> String {
        let permissions = GroupRole::ALL.iter().fold(self.permissions.clone(), |acc, role| {
            acc.replace(role.placeholder(), &quote_ident(groups.get(*role)))
        });

        let mut sql = String::with_capacity(self.base.len() + permissions.len() + 1);
        sql.push_str(&self.base);
        if !self.base.ends_with('\n') {
            sql.push('\n');
        }
        sql.push_str(&permissions);
        sql
    }
}

/// Reads the schema template from its configured paths on every call.
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    base_schema_path: PathBuf,
    permissions_path: PathBuf,
}

impl TemplateLoader {
    pub fn new(base_schema_path: impl Into<PathBuf>, permissions_path: impl Into<PathBuf>) -> Self {
        Self {
            base_schema_path: base_schema_path.into(),
            permissions_path: permissions_path.into(),
        }
    }

    pub fn from_config(cfg: &SchemaConfig) -> Self {
        Self::new(cfg.base_schema_path.clone(), cfg.permissions_path.clone())
    }

    pub async fn load(&self) -> Result<SchemaTemplate, ProvisionError> {
        let base = read_script(&self.base_schema_path).await?;
        let permissions = read_script(&self.permissions_path).await?;
        Ok(SchemaTemplate { base, permissions })
    }

    /// Full script for a new database: group preamble, base schema, permissions.
    pub async fn render(&self, database: &DatabaseName) -> Result<String, ProvisionError> {
        let groups = RoleGroups::for_database(database);
        let mut sql = role_group_preamble(&groups);
        sql.push_str(&self.load().await?.render_body(&groups));
        Ok(sql)
    }

    /// Replace the base schema used for databases created from now on.
    pub async fn save_base_schema(&self, sql: &str) -> Result<(), ProvisionError> {
        info!(path = %self.base_schema_path.display(), bytes = sql.len(), "saving base schema");
        fs::write(&self.base_schema_path, sql)
            .await
            .map_err(|source| ProvisionError::Io {
                path: self.base_schema_path.clone(),
                source,
            })
    }
}

async fn read_script(path: &Path) -> Result<String, ProvisionError> {
    info!(path = %path.display(), "reading sql");
    fs::read_to_string(path)
        .await
        .map_err(|source| ProvisionError::TemplateUnavailable {
            path: path.to_path_buf(),
            source,
        })
}
