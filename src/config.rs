use crate::db::credential::Secret;
use crate::error::ConfigError;
use crate::types::RoleName;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_FILE: &str = "openmolar.toml";

/// Secret keys and the environment variables they are read from verbatim.
const SECRET_ENV: [(&str, &str); 3] = [
    ("admin_key", "OPENMOLAR_ADMIN_KEY"),
    ("database.master_password", "OPENMOLAR_DATABASE__MASTER_PASSWORD"),
    ("provisioning.demo_password", "OPENMOLAR_PROVISIONING__DEMO_PASSWORD"),
];

/// Application configuration managed by Figment.
///
/// Constructed once in `main` and passed by reference to whatever needs it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server listen address.
    /// Env: `OPENMOLAR_LISTEN_ADDR`. Default: `127.0.0.1`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port.
    /// Env: `OPENMOLAR_LISTEN_PORT`. Default: `8190`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// Env: `OPENMOLAR_LOGLEVEL`. Default: `info`.
    #[serde(default)]
    pub loglevel: String,

    /// Key required on every administrative request (required, non-empty).
    /// Env: `OPENMOLAR_ADMIN_KEY`.
    #[serde(default, skip_serializing)]
    pub admin_key: Secret,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

/// Connection settings for the service account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Env: `OPENMOLAR_DATABASE__HOST`. Default: `127.0.0.1`.
    pub host: String,
    pub port: u16,
    /// Login that owns every provisioned database.
    pub service_account: String,
    /// Database used to issue create/drop statements.
    pub control_database: String,
    /// Env: `OPENMOLAR_DATABASE__MASTER_PASSWORD`. Never serialized.
    #[serde(default, skip_serializing)]
    pub master_password: Secret,
    /// Read when `master_password` is unset.
    pub master_password_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            service_account: "openmolar".to_string(),
            control_database: "openmolar_master".to_string(),
            master_password: Secret::default(),
            master_password_file: None,
            connect_timeout_secs: 10,
            statement_timeout_secs: 120,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs.max(1))
    }
}

/// Locations of the schema template scripts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    pub base_schema_path: PathBuf,
    pub permissions_path: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            base_schema_path: PathBuf::from("/usr/share/openmolar/blank_schema.sql"),
            permissions_path: PathBuf::from("/usr/share/openmolar/permissions.sql"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioningConfig {
    /// Executable that installs fuzzy-match functions; receives the database name.
    pub fuzzymatch_helper: PathBuf,
    pub helper_timeout_secs: u64,
    /// Drop a freshly created database when its schema cannot be applied.
    pub rollback_on_schema_failure: bool,
    pub demo_user: String,
    #[serde(default = "default_demo_password", skip_serializing)]
    pub demo_password: Secret,
    pub generated_password_length: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            fuzzymatch_helper: PathBuf::from("openmolar-install-fuzzymatch"),
            helper_timeout_secs: 60,
            rollback_on_schema_failure: false,
            demo_user: "om_demo".to_string(),
            demo_password: default_demo_password(),
            generated_password_length: 16,
        }
    }
}

impl ProvisioningConfig {
    pub fn helper_timeout(&self) -> Duration {
        Duration::from_secs(self.helper_timeout_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            loglevel: "info".to_string(),
            admin_key: Secret::default(),
            database: DatabaseConfig::default(),
            schema: SchemaConfig::default(),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl Config {
    /// Builds a Figment that merges defaults, an optional TOML file and
    /// `OPENMOLAR_`-prefixed environment variables (`__` separates tables).
    pub fn figment(path: &Path) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if path.is_file() {
            figment.merge(Toml::file(path))
        } else {
            figment
        };
        // The Env provider parses values (`007` becomes the integer 7), so
        // secrets bypass it and are merged as raw strings.
        let secret_keys = SECRET_ENV.map(|(key, _)| key);
        let mut figment = figment.merge(
            Env::prefixed("OPENMOLAR_")
                .split("__")
                .ignore(&secret_keys),
        );
        for (key, var) in SECRET_ENV {
            if let Ok(value) = std::env::var(var) {
                figment = figment.merge((key, value));
            }
        }
        figment
    }

    /// Loads configuration from `openmolar.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// Extracts and validates required fields.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: Self = figment.extract()?;
        if cfg.admin_key.is_empty() {
            return Err(ConfigError::Missing("admin_key"));
        }
        if cfg.provisioning.demo_password.is_empty() {
            return Err(ConfigError::Missing("provisioning.demo_password"));
        }
        cfg.demo_user()?;
        Ok(cfg)
    }

    pub fn demo_user(&self) -> Result<RoleName, ConfigError> {
        Ok(RoleName::parse(self.provisioning.demo_user.as_str())?)
    }
}

fn default_demo_password() -> Secret {
    Secret::new("password")
}

/// Default IP address for the HTTP server listen address.
pub fn default_listen_ip() -> IpAddr {
    Ipv4Addr::LOCALHOST.into()
}

/// Default port for the HTTP server.
pub fn default_listen_port() -> u16 {
    8190
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    fn base() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    #[test]
    fn defaults_match_installed_layout() {
        let cfg = Config::from_figment(base().merge(("admin_key", "k"))).unwrap();
        assert_eq!(cfg.database.service_account, "openmolar");
        assert_eq!(cfg.database.control_database, "openmolar_master");
        assert_eq!(cfg.database.host, "127.0.0.1");
        assert_eq!(
            cfg.schema.permissions_path,
            PathBuf::from("/usr/share/openmolar/permissions.sql")
        );
        assert_eq!(cfg.provisioning.demo_password.expose(), "password");
        assert!(!cfg.provisioning.rollback_on_schema_failure);
    }

    #[test]
    fn admin_key_is_required() {
        let err = Config::from_figment(base()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("admin_key")));
    }

    #[test]
    fn nested_values_override_defaults() {
        let cfg = Config::from_figment(
            base()
                .merge(("admin_key", "4711"))
                .merge(("database.master_password", "pw"))
                .merge(("provisioning.rollback_on_schema_failure", true)),
        )
        .unwrap();
        assert_eq!(cfg.admin_key.expose(), "4711");
        assert_eq!(cfg.database.master_password.expose(), "pw");
        assert!(cfg.provisioning.rollback_on_schema_failure);
    }

    #[test]
    fn invalid_demo_user_is_rejected() {
        let err = Config::from_figment(
            base()
                .merge(("admin_key", "k"))
                .merge(("provisioning.demo_user", "Demo User")),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut cfg = Config::default();
        cfg.admin_key = Secret::new("top-secret");
        cfg.database.master_password = Secret::new("also-secret");
        let rendered = serde_json::to_string(&cfg).unwrap();
        assert!(!rendered.contains("secret"));
        assert!(!format!("{cfg:?}").contains("top-secret"));
    }

    #[test]
    fn env_secrets_keep_their_exact_spelling() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OPENMOLAR_ADMIN_KEY", "0042");
            jail.set_env("OPENMOLAR_DATABASE__MASTER_PASSWORD", "007");
            jail.set_env("OPENMOLAR_PROVISIONING__DEMO_PASSWORD", "true");
            jail.set_env("OPENMOLAR_DATABASE__PORT", "5433");

            let cfg = Config::from_figment(Config::figment(Path::new(DEFAULT_CONFIG_FILE)))
                .expect("config from env");
            assert_eq!(cfg.admin_key.expose(), "0042");
            assert_eq!(cfg.database.master_password.expose(), "007");
            assert_eq!(cfg.provisioning.demo_password.expose(), "true");
            assert_eq!(cfg.database.port, 5433);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_config_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                admin_key = "from-file"

                [database]
                host = "db.internal"
                master_password = "file-secret"
                "#,
            )?;
            jail.set_env("OPENMOLAR_DATABASE__MASTER_PASSWORD", "0123");

            let cfg = Config::from_figment(Config::figment(Path::new(DEFAULT_CONFIG_FILE)))
                .expect("config from file and env");
            assert_eq!(cfg.admin_key.expose(), "from-file");
            assert_eq!(cfg.database.host, "db.internal");
            assert_eq!(cfg.database.master_password.expose(), "0123");
            Ok(())
        });
    }
}
