//! Provisioning service composing the lifecycle and user managers.
//!
//! ```text
//!            ProvisioningService (Provisioner)
//!              │                      │
//!      DatabaseLifecycle          UserManager
//!       │      │      │             │      │
//!  Templates Installer Executor ◀───┘  SecretGenerator
//!                       │
//!               MasterCredential
//! ```

use crate::config::Config;
use crate::db::credential::{MasterCredential, Secret};
use crate::db::executor::{PgExecutor, SqlExecutor};
use crate::error::{ConfigError, ProvisionError};
use crate::service::extension::{ExtensionInstaller, HelperProcess};
use crate::service::lifecycle::{DatabaseLifecycle, LifecycleSettings};
use crate::service::password::{RandomPassword, SecretGenerator};
use crate::service::template_loader::TemplateLoader;
use crate::service::users::{CreatedUser, UserManager};
use crate::types::{DatabaseName, DatabaseState, RoleName};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// The operation set offered to administrative front ends.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn list_managed_databases(&self) -> Vec<String>;

    async fn create_database(&self, name: &DatabaseName) -> Result<(), ProvisionError>;

    async fn drop_database(&self, name: &DatabaseName) -> Result<(), ProvisionError>;

    /// Retry the schema step for a database left without one.
    async fn apply_schema(&self, name: &DatabaseName) -> Result<(), ProvisionError>;

    async fn install_fuzzy_match(&self, name: &DatabaseName) -> Result<(), ProvisionError>;

    async fn create_user(
        &self,
        username: &RoleName,
        password: Option<Secret>,
    ) -> Result<CreatedUser, ProvisionError>;

    async fn grant_permissions(
        &self,
        user: &RoleName,
        database: &DatabaseName,
        admin: bool,
        client: bool,
    ) -> Result<usize, ProvisionError>;

    async fn create_demo_user(&self, database: &DatabaseName) -> Result<(), ProvisionError>;

    async fn save_schema(&self, sql: &str) -> Result<(), ProvisionError>;

    /// Create, then optionally add the demo user and fuzzy-match functions.
    async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionReport, ProvisionError>;
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: DatabaseName,
    pub demo_user: bool,
    pub fuzzymatch: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub database: DatabaseName,
    pub state: DatabaseState,
    /// `None` when not requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzymatch_installed: Option<bool>,
}

/// Collaborators the service delegates to.
pub struct Collaborators {
    pub executor: Arc<dyn SqlExecutor>,
    pub installer: Arc<dyn ExtensionInstaller>,
    pub generator: Arc<dyn SecretGenerator>,
}

pub struct ProvisioningService {
    lifecycle: DatabaseLifecycle,
    users: UserManager,
}

impl ProvisioningService {
    pub fn new(cfg: &Config, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let Collaborators {
            executor,
            installer,
            generator,
        } = collaborators;

        let lifecycle = DatabaseLifecycle::new(
            executor.clone(),
            TemplateLoader::from_config(&cfg.schema),
            installer,
            LifecycleSettings {
                service_account: cfg.database.service_account.clone(),
                control_database: cfg.database.control_database.clone(),
                rollback_on_schema_failure: cfg.provisioning.rollback_on_schema_failure,
            },
        );
        let users = UserManager::new(
            executor,
            generator,
            cfg.database.control_database.clone(),
            cfg.demo_user()?,
            cfg.provisioning.demo_password.clone(),
        );
        Ok(Self { lifecycle, users })
    }

    /// Wires the PostgreSQL executor, helper process and random passwords.
    pub fn connect(cfg: &Config) -> Result<Self, ConfigError> {
        let credential = Arc::new(MasterCredential::from_config(&cfg.database)?);
        let collaborators = Collaborators {
            executor: Arc::new(PgExecutor::new(credential, &cfg.database)),
            installer: Arc::new(HelperProcess::new(
                cfg.provisioning.fuzzymatch_helper.clone(),
                cfg.provisioning.helper_timeout(),
            )),
            generator: Arc::new(RandomPassword::new(cfg.provisioning.generated_password_length)),
        };
        Self::new(cfg, collaborators)
    }

    pub async fn render_schema(&self, name: &DatabaseName) -> Result<String, ProvisionError> {
        self.lifecycle.templates().render(name).await
    }
}

#[async_trait]
impl Provisioner for ProvisioningService {
    async fn list_managed_databases(&self) -> Vec<String> {
        self.lifecycle.list_managed_databases().await
    }

    async fn create_database(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.lifecycle.create_database(name).await
    }

    async fn drop_database(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.lifecycle.drop_database(name).await
    }

    async fn apply_schema(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.lifecycle.apply_schema(name).await
    }

    async fn install_fuzzy_match(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.lifecycle.install_fuzzy_match(name).await
    }

    async fn create_user(
        &self,
        username: &RoleName,
        password: Option<Secret>,
    ) -> Result<CreatedUser, ProvisionError> {
        self.users.create_user(username, password).await
    }

    async fn grant_permissions(
        &self,
        user: &RoleName,
        database: &DatabaseName,
        admin: bool,
        client: bool,
    ) -> Result<usize, ProvisionError> {
        self.users
            .grant_permissions(user, database, admin, client)
            .await
    }

    async fn create_demo_user(&self, database: &DatabaseName) -> Result<(), ProvisionError> {
        self.users.create_demo_user(database).await
    }

    async fn save_schema(&self, sql: &str) -> Result<(), ProvisionError> {
        self.lifecycle.templates().save_base_schema(sql).await
    }

    async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionReport, ProvisionError> {
        let ProvisionRequest {
            name,
            demo_user,
            fuzzymatch,
        } = request;

        // Create includes the schema step, so success means the database is ready.
        self.create_database(&name).await?;
        let state = if demo_user {
            self.create_demo_user(&name).await?;
            DatabaseState::DemoUserGranted
        } else {
            DatabaseState::SchemaApplied
        };

        let fuzzymatch_installed = if fuzzymatch {
            let installed = self.install_fuzzy_match(&name).await.is_ok();
            if !installed {
                warn!(database = %name, "continuing without fuzzymatch functions");
            }
            Some(installed)
        } else {
            None
        };

        info!(database = %name, state = ?state, "provisioning finished");
        Ok(ProvisionReport {
            database: name,
            state,
            fuzzymatch_installed,
        })
    }
}
