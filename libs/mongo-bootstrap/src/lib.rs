#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! MongoDB bootstrap for the `TinyX` backend.
//!
//! Brings a deployment to the state the services expect: an initiated replica set
//! with an elected primary, a root user on `admin`, and one database per service
//! holding a read-write credential and its seed collections. Every step checks
//! before it creates, so the whole sequence can be re-run safely.
//!
//! - [`AdminChannel`]: the administrative commands the provisioner needs, with a
//!   driver-backed implementation ([`MongoAdminChannel`]) and an in-memory one
//!   ([`InMemoryAdmin`]).
//! - [`ensure_replica_set_ready`] / [`wait_for_primary`]: the replica-set stage.
//! - [`Provisioner`]: root user and per-tenant provisioning, producing a
//!   [`ProvisionReport`].
//! - [`ProvisionerConfig`]: layered configuration (defaults, YAML, `TINYX__*` env).
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use mongo_bootstrap::{MongoAdminChannel, Provisioner, ProvisionerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProvisionerConfig::load(None)?;
//! let admin = Arc::new(MongoAdminChannel::connect(&config.connection).await?);
//! let provisioner = Provisioner::new(admin, config.plan()?);
//! let report = provisioner.run(&CancellationToken::new()).await?;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod error;
pub mod in_memory;
pub mod logging;
pub mod mongo;
pub mod provisioner;
pub mod replica_set;
pub mod report;
pub mod topology;

pub use admin::AdminChannel;
pub use catalog::{CatalogError, CatalogPreset, TenantCatalog, TenantSpec};
pub use config::{ConfigError, ProvisionerConfig};
pub use credentials::{CredentialSpec, Role, UserInfo};
pub use error::{AdminError, ProvisionError};
pub use in_memory::InMemoryAdmin;
pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use mongo::MongoAdminChannel;
pub use provisioner::{ProvisionPlan, Provisioner};
pub use replica_set::{
    PrimaryWaitPolicy, ReplicaSetPlan, ReplicaSetReadiness, ensure_replica_set_ready,
    wait_for_primary,
};
pub use report::{
    ProvisionReport, ReplicaSetStage, TenantProvisioned, TenantReport, UserProvisioned,
};
pub use topology::{MemberState, ReplicaMember, ReplicaSetConfig, ReplicaSetStatus};
