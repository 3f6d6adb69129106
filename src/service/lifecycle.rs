//! Create, drop and lay out managed databases.

use crate::db::executor::SqlExecutor;
use crate::db::statements::{self, MANAGED_DATABASES};
use crate::error::ProvisionError;
use crate::service::extension::ExtensionInstaller;
use crate::service::template_loader::TemplateLoader;
use crate::types::{DatabaseName, RoleGroups};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub service_account: String,
    pub control_database: String,
    pub rollback_on_schema_failure: bool,
}

pub struct DatabaseLifecycle {
    executor: Arc<dyn SqlExecutor>,
    templates: TemplateLoader,
    installer: Arc<dyn ExtensionInstaller>,
    settings: LifecycleSettings,
}

impl DatabaseLifecycle {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        templates: TemplateLoader,
        installer: Arc<dyn ExtensionInstaller>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            executor,
            templates,
            installer,
            settings,
        }
    }

    pub fn templates(&self) -> &TemplateLoader {
        &self.templates
    }

    /// Databases owned by the service account, control database excluded,
    /// sorted by name. Empty on any query error.
    pub async fn list_managed_databases(&self) -> Vec<String> {
        debug!("polling for available databases");
        let binds = [
            self.settings.service_account.as_str(),
            self.settings.control_database.as_str(),
        ];
        match self
            .executor
            .fetch_column(&self.settings.control_database, MANAGED_DATABASES, &binds)
            .await
        {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "unable to list managed databases");
                Vec::new()
            }
        }
    }

    /// Idempotent: dropping an absent database succeeds.
    pub async fn drop_database(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.ensure_managed(name)?;
        warn!(database = %name, "dropping database");
        self.executor
            .execute(&self.settings.control_database, &statements::drop_database(name))
            .await
            .inspect_err(|e| error!(database = %name, error = %e, "unable to drop database"))
    }

    /// Creates the database owned by the service account, then lays out the
    /// schema. A schema failure leaves the database in place unless rollback
    /// is configured.
    pub async fn create_database(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.ensure_managed(name)?;
        info!(
            database = %name,
            owner = %self.settings.service_account,
            "creating new database"
        );
        let statement = statements::create_database(name, &self.settings.service_account);
        self.executor
            .execute(&self.settings.control_database, &statement)
            .await
            .inspect_err(|e| error!(database = %name, error = %e, "unable to create database"))?;

        let Err(cause) = self.apply_schema(name).await else {
            info!(database = %name, "database ready");
            return Ok(());
        };

        let rolled_back = if self.settings.rollback_on_schema_failure {
            self.rollback(name).await
        } else {
            warn!(
                database = %name,
                "database left in place without schema; re-apply the schema or drop it"
            );
            false
        };
        Err(ProvisionError::SchemaNotApplied {
            database: name.to_string(),
            rolled_back,
            source: Box::new(cause),
        })
    }

    fn ensure_managed(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        name.ensure_managed(&self.settings.control_database)
            .inspect_err(|e| warn!(database = %name, error = %e, "refusing reserved database"))
    }

    async fn rollback(&self, name: &DatabaseName) -> bool {
        warn!(database = %name, "rolling back database after schema failure");
        self.drop_database(name).await.is_ok()
    }

    /// Lays out the schema template in an existing database.
    ///
    /// The role groups are recreated before the template files are read, so
    /// an unreadable template still leaves fresh, empty groups behind.
    pub async fn apply_schema(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.ensure_managed(name)?;
        info!(database = %name, "laying out schema");
        self.lay_out_schema(name)
            .await
            .inspect_err(|e| error!(database = %name, error = %e, "unable to lay out schema"))
    }

    async fn lay_out_schema(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        let groups = RoleGroups::for_database(name);
        self.executor
            .execute(name.as_str(), &statements::role_group_preamble(&groups))
            .await?;

        let template = self.templates.load().await?;
        self.executor
            .execute(name.as_str(), &template.render_body(&groups))
            .await
    }

    /// Never fatal to the caller beyond the returned error.
    pub async fn install_fuzzy_match(&self, name: &DatabaseName) -> Result<(), ProvisionError> {
        self.ensure_managed(name)?;
        info!(database = %name, "installing fuzzymatch functions");
        self.installer
            .install(name)
            .await
            .inspect_err(|e| error!(database = %name, error = %e, "unable to install fuzzymatch"))
    }
}
