use crate::config::DatabaseConfig;
use crate::db::credential::MasterCredential;
use crate::error::{ProvisionError, TimeoutStage};
use async_trait::async_trait;
use sqlx::{Connection, Executor, PgConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs statements against a named database.
///
/// One connection per call, autocommit, closed before returning.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one statement or a `;`-separated script.
    async fn execute(&self, database: &str, sql: &str) -> Result<(), ProvisionError>;

    /// Run a parameterised query returning a single text column.
    async fn fetch_column(
        &self,
        database: &str,
        query: &str,
        binds: &[&str],
    ) -> Result<Vec<String>, ProvisionError>;
}

/// PostgreSQL executor using the master credential.
#[derive(Debug, Clone)]
pub struct PgExecutor {
    credential: Arc<MasterCredential>,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl PgExecutor {
    pub fn new(credential: Arc<MasterCredential>, cfg: &DatabaseConfig) -> Self {
        Self {
            credential,
            connect_timeout: cfg.connect_timeout(),
            statement_timeout: cfg.statement_timeout(),
        }
    }

    async fn connect(&self, database: &str) -> Result<PgConnection, ProvisionError> {
        // Server-side limit as well, so an abandoned statement does not keep running.
        let opts = self.credential.connect_options(database).options([(
            "statement_timeout",
            format!("{}ms", self.statement_timeout.as_millis()),
        )]);

        match timeout(self.connect_timeout, PgConnection::connect_with(&opts)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(source)) => Err(ProvisionError::ConnectionFailure {
                database: database.to_string(),
                source,
            }),
            Err(_) => Err(ProvisionError::Timeout {
                database: database.to_string(),
                stage: TimeoutStage::Connect,
                after: self.connect_timeout,
            }),
        }
    }

    async fn close(conn: PgConnection, database: &str) {
        if let Err(e) = conn.close().await {
            warn!(database, error = %e, "failed to close connection cleanly");
        }
    }

    fn statement_error(&self, database: &str) -> impl FnOnce(sqlx::Error) -> ProvisionError {
        let database = database.to_string();
        move |source| ProvisionError::StatementFailure { database, source }
    }

    fn statement_timeout_error(&self, database: &str) -> ProvisionError {
        ProvisionError::Timeout {
            database: database.to_string(),
            stage: TimeoutStage::Statement,
            after: self.statement_timeout,
        }
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, database: &str, sql: &str) -> Result<(), ProvisionError> {
        let mut conn = self.connect(database).await?;
        // Statement text may carry a password; log its size only.
        debug!(database, bytes = sql.len(), "executing script");

        // A simple-query script runs as one implicit transaction.
        let outcome = timeout(self.statement_timeout, (&mut conn).execute(sqlx::raw_sql(sql))).await;
        Self::close(conn, database).await;

        match outcome {
            Ok(Ok(done)) => {
                debug!(database, rows = done.rows_affected(), "script finished");
                Ok(())
            }
            Ok(Err(source)) => Err(self.statement_error(database)(source)),
            Err(_) => Err(self.statement_timeout_error(database)),
        }
    }

    async fn fetch_column(
        &self,
        database: &str,
        query: &str,
        binds: &[&str],
    ) -> Result<Vec<String>, ProvisionError> {
        let mut conn = self.connect(database).await?;

        let mut q = sqlx::query_scalar::<sqlx::Postgres, String>(query);
        for value in binds {
            q = q.bind(value.to_string());
        }
        let outcome = timeout(self.statement_timeout, q.fetch_all(&mut conn)).await;
        Self::close(conn, database).await;

        match outcome {
            Ok(rows) => rows.map_err(self.statement_error(database)),
            Err(_) => Err(self.statement_timeout_error(database)),
        }
    }
}
