pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, ProvisionError};
pub use service::provisioning::{Collaborators, ProvisioningService, Provisioner};
