use crate::error::ProvisionError;
use crate::types::DatabaseName;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Installs optional database extensions out of process.
#[async_trait]
pub trait ExtensionInstaller: Send + Sync {
    async fn install(&self, database: &DatabaseName) -> Result<(), ProvisionError>;
}

/// Runs a helper executable with the database name as its sole argument.
#[derive(Debug, Clone)]
pub struct HelperProcess {
    program: PathBuf,
    timeout: Duration,
}

impl HelperProcess {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn failure(&self, reason: String) -> ProvisionError {
        ProvisionError::ExternalProcessFailure {
            program: self.program.display().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ExtensionInstaller for HelperProcess {
    async fn install(&self, database: &DatabaseName) -> Result<(), ProvisionError> {
        let mut child = Command::new(&self.program)
            .arg(database.as_str())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format!("unable to launch: {e}")))?;
        debug!(program = %self.program.display(), pid = ?child.id(), "helper launched");

        let waited = timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(self.failure(format!("wait failed: {e}"))),
            Err(_) => {
                let _ = child.kill().await;
                return Err(self.failure(format!("timed out after {:?}", self.timeout)));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(self.failure(format!("exited with {status}")))
        }
    }
}
