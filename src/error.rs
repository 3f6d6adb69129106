use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error as ThisError;

/// Failure of a single provisioning operation.
///
/// Every public operation returns this instead of panicking, after logging the
/// failure at its own boundary. Messages never carry the master secret or a
/// role password.
#[derive(Debug, ThisError)]
pub enum ProvisionError {
    #[error("unable to connect to database {database:?}: {source}")]
    ConnectionFailure {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement failed on database {database:?}: {source}")]
    StatementFailure {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{stage} on database {database:?} timed out after {after:?}")]
    Timeout {
        database: String,
        stage: TimeoutStage,
        after: Duration,
    },

    #[error("schema template unavailable at {}: {source}", path.display())]
    TemplateUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("external helper {program} failed: {reason}")]
    ExternalProcessFailure { program: String, reason: String },

    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("database {database:?} created but schema not applied (rolled back: {rolled_back}): {source}")]
    SchemaNotApplied {
        database: String,
        rolled_back: bool,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("unable to write schema to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("provisioning actor unavailable: {0}")]
    Unavailable(String),
}

/// Which bounded step of a database call ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    Connect,
    Statement,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Statement => f.write_str("statement"),
        }
    }
}

/// Coarse failure classes callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionFailure,
    StatementFailure,
    TemplateUnavailable,
    ExternalProcessFailure,
    InvalidInput,
    /// The server's own file writes or actor, not the cluster or the helper.
    Internal,
}

impl ProvisionError {
    /// Classifies the error. A schema failure reports the kind of its cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailure { .. } => ErrorKind::ConnectionFailure,
            Self::Timeout {
                stage: TimeoutStage::Connect,
                ..
            } => ErrorKind::ConnectionFailure,
            Self::StatementFailure { .. }
            | Self::Timeout {
                stage: TimeoutStage::Statement,
                ..
            } => ErrorKind::StatementFailure,
            Self::TemplateUnavailable { .. } => ErrorKind::TemplateUnavailable,
            Self::ExternalProcessFailure { .. } => ErrorKind::ExternalProcessFailure,
            Self::InvalidName { .. } => ErrorKind::InvalidInput,
            Self::SchemaNotApplied { source, .. } => source.kind(),
            Self::Io { .. } | Self::Unavailable(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised while assembling configuration at startup.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("{0} must be set and non-empty")]
    Missing(&'static str),

    #[error("unable to read master password file {}: {source}", path.display())]
    MasterPasswordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration value: {0}")]
    Invalid(#[from] ProvisionError),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Extract(Box::new(e))
    }
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            ProvisionError::InvalidName { .. } => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
            ProvisionError::ConnectionFailure { .. } | ProvisionError::Timeout { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_UNAVAILABLE")
            }
            ProvisionError::StatementFailure { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "STATEMENT_FAILED")
            }
            ProvisionError::SchemaNotApplied { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SCHEMA_NOT_APPLIED")
            }
            ProvisionError::TemplateUnavailable { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TEMPLATE_UNAVAILABLE")
            }
            ProvisionError::ExternalProcessFailure { .. } => {
                (StatusCode::BAD_GATEWAY, "EXTERNAL_PROCESS_FAILED")
            }
            ProvisionError::Io { .. } | ProvisionError::Unavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        let body = ApiErrorBody {
            code: code.to_string(),
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
