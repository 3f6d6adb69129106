#![allow(dead_code)]

use async_trait::async_trait;
use openmolar_provision::{
    Collaborators, Config, ProvisionError, ProvisioningService,
    db::{InMemoryCluster, Secret},
    service::{extension::ExtensionInstaller, password::SecretGenerator},
    types::DatabaseName,
};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

pub const BASE_SCHEMA: &str = "\
-- patient records
CREATE TABLE patients (serialno int primary key, sname varchar(30));
CREATE TABLE appointments (serialno int, adate date);
";

pub const PERMISSIONS: &str = "\
GRANT ALL ON ALL TABLES IN SCHEMA public TO ADMIN_GROUP;
GRANT SELECT, INSERT, UPDATE ON patients, appointments TO CLIENT_GROUP;
";

/// A per-test directory holding the two template files.
pub struct TemplateDir {
    pub root: PathBuf,
}

impl TemplateDir {
    pub fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut root = std::env::temp_dir();
        root.push(format!(
            "openmolar-provision-{label}-{}-{}",
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&root).expect("failed to create template dir");
        let dir = Self { root };
        fs::write(dir.base_schema(), BASE_SCHEMA).expect("failed to write base schema");
        fs::write(dir.permissions(), PERMISSIONS).expect("failed to write permissions");
        dir
    }

    pub fn base_schema(&self) -> PathBuf {
        self.root.join("blank_schema.sql")
    }

    pub fn permissions(&self) -> PathBuf {
        self.root.join("permissions.sql")
    }

    pub fn remove_templates(&self) {
        let _ = fs::remove_file(self.base_schema());
        let _ = fs::remove_file(self.permissions());
    }
}

impl Drop for TemplateDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

/// Records every database it is asked to install into.
#[derive(Default)]
pub struct RecordingInstaller {
    pub installed: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl ExtensionInstaller for RecordingInstaller {
    async fn install(&self, database: &DatabaseName) -> Result<(), ProvisionError> {
        if self.fail {
            return Err(ProvisionError::ExternalProcessFailure {
                program: "fake-fuzzymatch".to_string(),
                reason: "exit status 1".to_string(),
            });
        }
        self.installed
            .lock()
            .expect("installer mutex poisoned")
            .push(database.to_string());
        Ok(())
    }
}

pub struct FixedPassword(pub &'static str);

impl SecretGenerator for FixedPassword {
    fn generate(&self) -> Secret {
        Secret::new(self.0)
    }
}

pub fn config(templates: &TemplateDir) -> Config {
    let mut cfg = Config::default();
    cfg.admin_key = Secret::new("pwd");
    cfg.schema.base_schema_path = templates.base_schema();
    cfg.schema.permissions_path = templates.permissions();
    cfg
}

pub struct Fixture {
    pub cluster: Arc<InMemoryCluster>,
    pub installer: Arc<RecordingInstaller>,
    pub service: ProvisioningService,
}

pub fn fixture(cfg: &Config, installer: RecordingInstaller) -> Fixture {
    let cluster = Arc::new(InMemoryCluster::new(
        &cfg.database.service_account,
        &cfg.database.control_database,
    ));
    let installer = Arc::new(installer);
    let service = ProvisioningService::new(
        cfg,
        Collaborators {
            executor: cluster.clone(),
            installer: installer.clone(),
            generator: Arc::new(FixedPassword("Generated123")),
        },
    )
    .expect("failed to build provisioning service");
    Fixture {
        cluster,
        installer,
        service,
    }
}

pub fn db(name: &str) -> DatabaseName {
    DatabaseName::parse(name).expect("valid database name")
}
