use crate::db::credential::Secret;
use crate::db::executor::SqlExecutor;
use crate::db::statements;
use crate::error::ProvisionError;
use crate::service::password::SecretGenerator;
use crate::types::{DatabaseName, GroupRole, RoleGroups, RoleName};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A login role just created, with the password if the server chose it.
#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub username: RoleName,
    pub generated_password: Option<Secret>,
}

pub struct UserManager {
    executor: Arc<dyn SqlExecutor>,
    generator: Arc<dyn SecretGenerator>,
    control_database: String,
    demo_user: RoleName,
    demo_password: Secret,
}

impl UserManager {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        generator: Arc<dyn SecretGenerator>,
        control_database: impl Into<String>,
        demo_user: RoleName,
        demo_password: Secret,
    ) -> Self {
        Self {
            executor,
            generator,
            control_database: control_database.into(),
            demo_user,
            demo_password,
        }
    }

    /// Creates a login role. Roles are cluster-wide, so this runs on the
    /// control database.
    pub async fn create_user(
        &self,
        username: &RoleName,
        password: Option<Secret>,
    ) -> Result<CreatedUser, ProvisionError> {
        info!(user = %username, "adding login role");

        let (password, generated) = match password {
            Some(p) if !p.is_empty() => (p, false),
            _ => (self.generator.generate(), true),
        };
        self.executor
            .execute(
                &self.control_database,
                &statements::create_login_role(username, &password),
            )
            .await
            .inspect_err(|e| error!(user = %username, error = %e, "unable to create user"))?;

        Ok(CreatedUser {
            username: username.clone(),
            generated_password: generated.then_some(password),
        })
    }

    /// Adds `user` to the selected role groups of `database`. Returns the
    /// number of grants issued; with neither flag set nothing is executed.
    pub async fn grant_permissions(
        &self,
        user: &RoleName,
        database: &DatabaseName,
        admin: bool,
        client: bool,
    ) -> Result<usize, ProvisionError> {
        database.ensure_managed(&self.control_database)?;
        let groups = RoleGroups::for_database(database);
        let grants: Vec<String> = GroupRole::ALL
            .iter()
            .filter(|role| match role {
                GroupRole::Admin => admin,
                GroupRole::Client => client,
            })
            .map(|role| statements::grant_group(groups.get(*role), user))
            .collect();

        if grants.is_empty() {
            debug!(user = %user, database = %database, "no groups requested");
            return Ok(0);
        }

        info!(user = %user, database = %database, admin, client, "adding user to privilege groups");
        let script = grants.join(";\n") + ";\n";
        self.executor
            .execute(database.as_str(), &script)
            .await
            .inspect_err(|e| {
                error!(user = %user, database = %database, error = %e, "unable to grant permissions")
            })?;
        Ok(grants.len())
    }

    /// Creates the demo login (tolerating an existing one) and grants it
    /// both groups of `database`.
    pub async fn create_demo_user(&self, database: &DatabaseName) -> Result<(), ProvisionError> {
        database.ensure_managed(&self.control_database)?;
        info!(user = %self.demo_user, database = %database, "creating demo user");
        match self
            .create_user(&self.demo_user, Some(self.demo_password.clone()))
            .await
        {
            Ok(_) => info!(user = %self.demo_user, "demo user created"),
            Err(e) => error!(
                user = %self.demo_user,
                error = %e,
                "unable to create demo user, perhaps it exists already"
            ),
        }
        self.grant_permissions(&self.demo_user, database, true, true)
            .await
            .map(|_| ())
    }
}
