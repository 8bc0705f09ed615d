#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Configuration layering: defaults < YAML file < `TINYX__*` environment.

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use mongo_bootstrap::{CatalogPreset, LogFormat, ProvisionerConfig};
use secrecy::ExposeSecret;

const STANDALONE_YAML: &str = r#"
connection:
  uri: "mongodb://users-mongodb:27017"
  connect_timeout: 3s
replica_set:
  enabled: false
root_user:
  enabled: false
credentials:
  username: service
  password: from-file
catalog:
  preset: standalone
logging:
  level: debug
  format: json
"#;

#[test]
fn yaml_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("provisioner.yaml", STANDALONE_YAML)?;

        let cfg = ProvisionerConfig::load(Some(Path::new("provisioner.yaml"))).unwrap();
        assert_eq!(cfg.connection.uri, "mongodb://users-mongodb:27017");
        assert_eq!(cfg.connection.connect_timeout, Duration::from_secs(3));
        assert!(!cfg.replica_set.enabled);
        assert_eq!(cfg.credentials.username, "service");
        assert_eq!(cfg.credentials.password.expose_secret(), "from-file");
        assert_eq!(cfg.catalog.preset, CatalogPreset::Standalone);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        let plan = cfg.plan().unwrap();
        assert!(plan.replica_set.is_none());
        assert_eq!(plan.catalog.len(), 4);
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("provisioner.yaml", STANDALONE_YAML)?;
        jail.set_env("TINYX__CREDENTIALS__PASSWORD", "from-env");
        jail.set_env("TINYX__CATALOG__PRESET", "merged-timelines");
        jail.set_env("TINYX__REPLICA_SET__ENABLED", "true");
        jail.set_env("TINYX__REPLICA_SET__MAX_ATTEMPTS", "5");

        let cfg = ProvisionerConfig::load(Some(Path::new("provisioner.yaml"))).unwrap();
        assert_eq!(cfg.credentials.password.expose_secret(), "from-env");
        assert_eq!(cfg.catalog.preset, CatalogPreset::MergedTimelines);
        assert!(cfg.replica_set.enabled);
        assert_eq!(cfg.replica_set.max_attempts, 5);
        // Members fall back to the built-in topology.
        assert_eq!(cfg.replica_set.members.len(), 2);
        Ok(())
    });
}

#[test]
fn defaults_without_file() {
    Jail::expect_with(|_jail| {
        let cfg = ProvisionerConfig::load(None).unwrap();
        assert_eq!(cfg.connection.uri, "mongodb://127.0.0.1:27017");
        assert!(cfg.root_user.enabled);
        assert_eq!(cfg.catalog().unwrap().tenants()[0].database, "users_db");
        Ok(())
    });
}

#[test]
fn explicit_tenant_list_from_yaml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "tenants.yaml",
            r"
catalog:
  tenants:
    - database: users_db
      collections: [Users]
    - database: timelines_db
      collections: [UserTimelines, HomeTimelines]
",
        )?;

        let cfg = ProvisionerConfig::load(Some(Path::new("tenants.yaml"))).unwrap();
        let catalog = cfg.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.tenants()[1].collections,
            ["UserTimelines", "HomeTimelines"]
        );
        Ok(())
    });
}

#[test]
fn invalid_catalog_is_rejected_at_load() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "dup.yaml",
            r"
catalog:
  tenants:
    - database: users_db
      collections: [Users]
    - database: users_db
      collections: [Users]
",
        )?;

        let err = ProvisionerConfig::load(Some(Path::new("dup.yaml"))).unwrap_err();
        assert!(err.to_string().contains("users_db"));
        Ok(())
    });
}

#[test]
fn numeric_password_from_environment() {
    Jail::expect_with(|jail| {
        jail.set_env("TINYX__CREDENTIALS__PASSWORD", "123456");

        let cfg = ProvisionerConfig::load(None).unwrap();
        assert_eq!(cfg.credentials.password.expose_secret(), "123456");
        Ok(())
    });
}

#[test]
fn scalar_passwords_from_yaml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "digits.yaml",
            r"
credentials:
  password: 123456
root_user:
  password: true
",
        )?;

        let cfg = ProvisionerConfig::load(Some(Path::new("digits.yaml"))).unwrap();
        assert_eq!(cfg.credentials.password.expose_secret(), "123456");
        assert_eq!(cfg.root_user.password.expose_secret(), "true");
        Ok(())
    });
}
