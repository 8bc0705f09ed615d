//! Layered provisioner configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults (the values the shared k3s deployment expects),
//! 2. an optional YAML file,
//! 3. environment variables prefixed with [`ENV_PREFIX`], `__` separating nested keys
//!    (`TINYX__CONNECTION__URI`, `TINYX__REPLICA_SET__MAX_ATTEMPTS`).

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use secrecy::SecretString;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::catalog::{CatalogError, CatalogPreset, TenantCatalog, TenantSpec};
use crate::credentials::CredentialSpec;
use crate::logging::LoggingConfig;
use crate::provisioner::ProvisionPlan;
use crate::replica_set::{PrimaryWaitPolicy, ReplicaSetPlan};
use crate::topology::{ReplicaMember, ReplicaSetConfig};

pub const ENV_PREFIX: &str = "TINYX__";

const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid tenant catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to render configuration: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub connection: ConnectionConfig,
    pub replica_set: ReplicaSetSection,
    pub credentials: CredentialsConfig,
    pub root_user: RootUserConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub uri: String,
    pub app_name: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_owned(),
            app_name: "tinyx-provisioner".to_owned(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaSetSection {
    pub enabled: bool,
    pub set_name: String,
    pub members: Vec<ReplicaMember>,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for ReplicaSetSection {
    fn default() -> Self {
        let topology = ReplicaSetConfig::default();
        let wait = PrimaryWaitPolicy::default();
        Self {
            enabled: true,
            set_name: topology.set_name,
            members: topology.members,
            max_attempts: wait.max_attempts,
            interval: wait.interval,
        }
    }
}

/// Credential created on every tenant database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,
    #[serde(
        serialize_with = "serialize_redacted",
        deserialize_with = "deserialize_secret"
    )]
    pub password: SecretString,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_owned(),
            password: SecretString::from(DEFAULT_PASSWORD),
        }
    }
}

/// Root credential on the `admin` database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootUserConfig {
    pub enabled: bool,
    pub username: String,
    #[serde(
        serialize_with = "serialize_redacted",
        deserialize_with = "deserialize_secret"
    )]
    pub password: SecretString,
}

impl Default for RootUserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: DEFAULT_USERNAME.to_owned(),
            password: SecretString::from(DEFAULT_PASSWORD),
        }
    }
}

/// Tenant catalog selection. A non-empty `tenants` list overrides `preset`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub preset: CatalogPreset,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tenants: Vec<TenantSpec>,
}

fn serialize_redacted<S: Serializer>(_: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str("[REDACTED]")
}

/// Accepts any scalar; env and YAML sources deliver `123456` or `true` already typed.
fn deserialize_secret<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
    d.deserialize_any(SecretVisitor).map(SecretString::from)
}

struct SecretVisitor;

impl Visitor<'_> for SecretVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a password string or scalar")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_char<E: de::Error>(self, v: char) -> Result<String, E> {
        Ok(v.to_string())
    }
}

impl ProvisionerConfig {
    /// Load defaults, then `path` (if any), then `TINYX__*` environment variables,
    /// and validate the result.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a source cannot be parsed or the merged
    /// configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate from an already assembled figment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on extraction or validation failure.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("connection.uri is empty".to_owned()));
        }
        if self.credentials.username.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "credentials.username is empty".to_owned(),
            ));
        }
        if self.root_user.enabled && self.root_user.username.trim().is_empty() {
            return Err(ConfigError::Invalid("root_user.username is empty".to_owned()));
        }
        if self.replica_set.enabled {
            self.validate_replica_set()?;
        }
        self.catalog()?;
        Ok(())
    }

    fn validate_replica_set(&self) -> Result<(), ConfigError> {
        let rs = &self.replica_set;
        if rs.set_name.trim().is_empty() {
            return Err(ConfigError::Invalid("replica_set.set_name is empty".to_owned()));
        }
        if rs.members.is_empty() {
            return Err(ConfigError::Invalid("replica_set.members is empty".to_owned()));
        }
        if rs.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "replica_set.max_attempts must be at least 1".to_owned(),
            ));
        }

        let mut ids = HashSet::new();
        let mut hosts = HashSet::new();
        for member in &rs.members {
            if member.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "replica_set member {} has an empty host",
                    member.id
                )));
            }
            if !ids.insert(member.id) {
                return Err(ConfigError::Invalid(format!(
                    "replica_set member id {} is used more than once",
                    member.id
                )));
            }
            if !hosts.insert(member.host.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "replica_set host '{}' is listed more than once",
                    member.host
                )));
            }
        }
        Ok(())
    }

    /// Tenant catalog selected by this configuration.
    ///
    /// # Errors
    /// Returns [`CatalogError`] if an explicit tenant list is invalid.
    pub fn catalog(&self) -> Result<TenantCatalog, CatalogError> {
        if self.catalog.tenants.is_empty() {
            Ok(TenantCatalog::preset(self.catalog.preset))
        } else {
            TenantCatalog::new(self.catalog.tenants.clone())
        }
    }

    /// Translate the configuration into the steps the provisioner executes.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration does not validate.
    pub fn plan(&self) -> Result<ProvisionPlan, ConfigError> {
        self.validate()?;

        let replica_set = self.replica_set.enabled.then(|| ReplicaSetPlan {
            topology: ReplicaSetConfig {
                set_name: self.replica_set.set_name.clone(),
                members: self.replica_set.members.clone(),
            },
            wait: PrimaryWaitPolicy {
                max_attempts: self.replica_set.max_attempts,
                interval: self.replica_set.interval,
            },
        });

        let root_user = self.root_user.enabled.then(|| {
            CredentialSpec::root(
                self.root_user.username.clone(),
                self.root_user.password.clone(),
            )
        });

        Ok(ProvisionPlan {
            replica_set,
            root_user,
            tenant_username: self.credentials.username.clone(),
            tenant_password: self.credentials.password.clone(),
            catalog: self.catalog()?,
        })
    }

    /// Render as YAML with secrets redacted.
    ///
    /// # Errors
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Render(e.to_string()))
    }
}
