use crate::db::credential::Secret;
use crate::error::ProvisionError;
use crate::service::provisioning::{ProvisionReport, ProvisionRequest, Provisioner};
use crate::service::users::CreatedUser;
use crate::types::{DatabaseName, RoleName};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use tracing::{debug, info};

type Reply<T> = RpcReplyPort<Result<T, ProvisionError>>;

/// Messages handled by the provisioning actor, one at a time.
#[derive(Debug)]
pub enum ProvisioningMessage {
    ListDatabases(RpcReplyPort<Vec<String>>),
    Provision(ProvisionRequest, Reply<ProvisionReport>),
    DropDatabase(DatabaseName, Reply<()>),
    ApplySchema(DatabaseName, Reply<()>),
    InstallFuzzyMatch(DatabaseName, Reply<()>),
    CreateDemoUser(DatabaseName, Reply<()>),
    CreateUser(RoleName, Option<Secret>, Reply<CreatedUser>),
    GrantPermissions(RoleName, DatabaseName, bool, bool, Reply<usize>),
    SaveSchema(String, Reply<()>),
}

/// Handle for submitting operations to the provisioning actor.
///
/// Operations never overlap: the actor finishes one before taking the next.
#[derive(Clone)]
pub struct ProvisioningHandle {
    actor: ActorRef<ProvisioningMessage>,
}

fn unavailable(op: &str, e: impl std::fmt::Display) -> ProvisionError {
    ProvisionError::Unavailable(format!("{op} RPC failed: {e}"))
}

impl ProvisioningHandle {
    pub async fn list_databases(&self) -> Result<Vec<String>, ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::ListDatabases)
            .map_err(|e| unavailable("ListDatabases", e))
    }

    pub async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionReport, ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::Provision, request)
            .map_err(|e| unavailable("Provision", e))?
    }

    pub async fn drop_database(&self, name: DatabaseName) -> Result<(), ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::DropDatabase, name)
            .map_err(|e| unavailable("DropDatabase", e))?
    }

    pub async fn apply_schema(&self, name: DatabaseName) -> Result<(), ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::ApplySchema, name)
            .map_err(|e| unavailable("ApplySchema", e))?
    }

    pub async fn install_fuzzy_match(&self, name: DatabaseName) -> Result<(), ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::InstallFuzzyMatch, name)
            .map_err(|e| unavailable("InstallFuzzyMatch", e))?
    }

    pub async fn create_demo_user(&self, name: DatabaseName) -> Result<(), ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::CreateDemoUser, name)
            .map_err(|e| unavailable("CreateDemoUser", e))?
    }

    pub async fn create_user(
        &self,
        username: RoleName,
        password: Option<Secret>,
    ) -> Result<CreatedUser, ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::CreateUser, username, password)
            .map_err(|e| unavailable("CreateUser", e))?
    }

    pub async fn grant_permissions(
        &self,
        user: RoleName,
        database: DatabaseName,
        admin: bool,
        client: bool,
    ) -> Result<usize, ProvisionError> {
        ractor::call!(
            self.actor,
            ProvisioningMessage::GrantPermissions,
            user,
            database,
            admin,
            client
        )
        .map_err(|e| unavailable("GrantPermissions", e))?
    }

    pub async fn save_schema(&self, sql: String) -> Result<(), ProvisionError> {
        ractor::call!(self.actor, ProvisioningMessage::SaveSchema, sql)
            .map_err(|e| unavailable("SaveSchema", e))?
    }
}

struct ProvisioningActor;

#[ractor::async_trait]
impl Actor for ProvisioningActor {
    type Msg = ProvisioningMessage;
    type State = Arc<dyn Provisioner>;
    type Arguments = Arc<dyn Provisioner>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        provisioner: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("ProvisioningActor started");
        Ok(provisioner)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        provisioner: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // A dropped reply port only means the caller gave up waiting.
        match message {
            ProvisioningMessage::ListDatabases(rp) => {
                let _ = rp.send(provisioner.list_managed_databases().await);
            }
            ProvisioningMessage::Provision(request, rp) => {
                let _ = rp.send(provisioner.provision(request).await);
            }
            ProvisioningMessage::DropDatabase(name, rp) => {
                let _ = rp.send(provisioner.drop_database(&name).await);
            }
            ProvisioningMessage::ApplySchema(name, rp) => {
                let _ = rp.send(provisioner.apply_schema(&name).await);
            }
            ProvisioningMessage::InstallFuzzyMatch(name, rp) => {
                let _ = rp.send(provisioner.install_fuzzy_match(&name).await);
            }
            ProvisioningMessage::CreateDemoUser(name, rp) => {
                let _ = rp.send(provisioner.create_demo_user(&name).await);
            }
            ProvisioningMessage::CreateUser(username, password, rp) => {
                let _ = rp.send(provisioner.create_user(&username, password).await);
            }
            ProvisioningMessage::GrantPermissions(user, database, admin, client, rp) => {
                let _ = rp.send(
                    provisioner
                        .grant_permissions(&user, &database, admin, client)
                        .await,
                );
            }
            ProvisioningMessage::SaveSchema(sql, rp) => {
                let _ = rp.send(provisioner.save_schema(&sql).await);
            }
        }
        debug!("ProvisioningActor idle");
        Ok(())
    }
}

/// Spawn the provisioning actor and return a handle.
pub async fn spawn(provisioner: Arc<dyn Provisioner>) -> Result<ProvisioningHandle, ProvisionError> {
    let (actor, _jh) = Actor::spawn(None, ProvisioningActor, provisioner)
        .await
        .map_err(|e| ProvisionError::Unavailable(format!("failed to spawn ProvisioningActor: {e}")))?;
    Ok(ProvisioningHandle { actor })
}
