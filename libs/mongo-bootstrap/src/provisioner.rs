//! The provisioning sequence.
//!
//! ```text
//! replica set ready -> primary elected -> root user -> tenant 1 .. tenant N
//! ```
//!
//! The replica-set stages are fatal: if one fails nothing else runs. The root user
//! and each tenant are independent; a failure is logged and the run moves on.
//! Every create is preceded by an existence check so a re-run after a partial
//! failure only does the missing work. The check and the create are separate
//! commands, so two provisioners racing on the same database can still both try to
//! create the credential; the loser reports a creation failure.

use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admin::AdminChannel;
use crate::catalog::{TenantCatalog, TenantSpec};
use crate::credentials::{ADMIN_DATABASE, CredentialSpec};
use crate::error::ProvisionError;
use crate::replica_set::{ReplicaSetPlan, ensure_replica_set_ready, wait_for_primary};
use crate::report::{
    ProvisionReport, ReplicaSetStage, TenantProvisioned, TenantReport, UserProvisioned,
};

/// Everything a run does, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    /// `None` skips replica-set initiation and the primary wait.
    pub replica_set: Option<ReplicaSetPlan>,
    /// `None` skips the root credential.
    pub root_user: Option<CredentialSpec>,
    pub tenant_username: String,
    pub tenant_password: SecretString,
    pub catalog: TenantCatalog,
}

impl ProvisionPlan {
    /// Credential created on `database`.
    #[must_use]
    pub fn tenant_credential(&self, database: &str) -> CredentialSpec {
        CredentialSpec::read_write(
            self.tenant_username.clone(),
            self.tenant_password.clone(),
            database,
        )
    }
}

pub struct Provisioner<A: AdminChannel> {
    admin: Arc<A>,
    plan: ProvisionPlan,
}

impl<A: AdminChannel> Provisioner<A> {
    #[must_use]
    pub fn new(admin: Arc<A>, plan: ProvisionPlan) -> Self {
        Self { admin, plan }
    }

    #[must_use]
    pub fn plan(&self) -> &ProvisionPlan {
        &self.plan
    }

    /// Run the whole sequence.
    ///
    /// Tenant-local failures are recorded in the returned report.
    ///
    /// # Errors
    /// Returns the stage-fatal error that halted the run (replica-set initiation,
    /// primary election timeout, cancellation).
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ProvisionReport, ProvisionError> {
        info!(tenants = self.plan.catalog.len(), "Starting initialization process");

        let replica_set = self
            .prepare_replica_set(cancel)
            .await
            .inspect_err(|e| error!(error = %e, "Replica set stage failed, halting"))?;

        let root_user = match &self.plan.root_user {
            Some(credential) => Some(self.ensure_administrative_user(credential).await),
            None => {
                debug!("Root user disabled");
                None
            }
        };

        let mut tenants = Vec::with_capacity(self.plan.catalog.len());
        for tenant in &self.plan.catalog {
            tenants.push(TenantReport {
                database: tenant.database.clone(),
                result: self.ensure_tenant(tenant).await,
            });
        }

        let report = ProvisionReport {
            replica_set,
            root_user,
            tenants,
        };

        if report.is_complete() {
            info!(
                created = report.created_tenants(),
                existing = report.existing_tenants(),
                "All databases initialization completed successfully"
            );
        } else {
            warn!(
                created = report.created_tenants(),
                existing = report.existing_tenants(),
                failed = report.failures().count(),
                "Initialization finished with failures"
            );
        }

        Ok(report)
    }

    async fn prepare_replica_set(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReplicaSetStage, ProvisionError> {
        let Some(plan) = &self.plan.replica_set else {
            debug!("Replica set stage disabled");
            return Ok(ReplicaSetStage::Skipped);
        };

        let readiness = ensure_replica_set_ready(self.admin.as_ref(), &plan.topology).await?;
        info!("Waiting for primary election...");
        let primary = wait_for_primary(self.admin.as_ref(), &plan.wait, cancel).await?;
        info!(primary = %primary.host, "Primary elected, initializing databases...");

        Ok(ReplicaSetStage::Ready {
            readiness,
            primary: primary.host,
        })
    }

    /// Create the root credential on `admin` unless a user with the same name exists.
    ///
    /// # Errors
    /// Returns [`ProvisionError::CredentialLookupFailed`] or
    /// [`ProvisionError::CredentialCreationFailed`]; both are already logged.
    pub async fn ensure_administrative_user(
        &self,
        credential: &CredentialSpec,
    ) -> Result<UserProvisioned, ProvisionError> {
        self.create_user_if_missing(ADMIN_DATABASE, credential)
            .await
            .map(|created| {
                if created {
                    info!(username = %credential.username, "Admin user created");
                    UserProvisioned::Created
                } else {
                    info!(username = %credential.username, "Admin user already exists");
                    UserProvisioned::AlreadyExists
                }
            })
            .inspect_err(|e| error!(database = ADMIN_DATABASE, error = %e, "Error creating admin user"))
    }

    /// Provision one tenant database: credential first, then its collections.
    ///
    /// If the tenant credential already exists the tenant is considered provisioned
    /// and nothing is sent.
    ///
    /// # Errors
    /// Returns a tenant-local [`ProvisionError`]; it is already logged.
    pub async fn ensure_tenant(
        &self,
        tenant: &TenantSpec,
    ) -> Result<TenantProvisioned, ProvisionError> {
        self.provision_tenant(tenant).await.inspect_err(|e| {
            error!(database = %tenant.database, error = %e, "Error creating database");
        })
    }

    async fn provision_tenant(
        &self,
        tenant: &TenantSpec,
    ) -> Result<TenantProvisioned, ProvisionError> {
        let database = tenant.database.as_str();
        let credential = self.plan.tenant_credential(database);

        if !self.create_user_if_missing(database, &credential).await? {
            info!(database, "User for database already exists");
            return Ok(TenantProvisioned::AlreadyProvisioned);
        }

        for collection in &tenant.collections {
            self.admin
                .create_collection(database, collection)
                .await
                .map_err(|source| {
                    warn!(
                        database,
                        collection = %collection,
                        "Credential already created; a re-run will skip this database, create the collection manually"
                    );
                    ProvisionError::CollectionCreationFailed {
                        database: database.to_owned(),
                        collection: collection.clone(),
                        source,
                    }
                })?;
            debug!(database, collection = %collection, "Collection created");
        }

        info!(database, "Database initialized successfully");
        Ok(TenantProvisioned::Created {
            collections: tenant.collections.clone(),
        })
    }

    /// Returns `true` if the user was created, `false` if it already existed.
    async fn create_user_if_missing(
        &self,
        database: &str,
        credential: &CredentialSpec,
    ) -> Result<bool, ProvisionError> {
        let users = self.admin.list_users(database).await.map_err(|source| {
            ProvisionError::CredentialLookupFailed {
                database: database.to_owned(),
                source,
            }
        })?;

        if users.iter().any(|u| u.username == credential.username) {
            return Ok(false);
        }

        info!(database, username = %credential.username, role = %credential.role, "Creating user");
        self.admin
            .create_user(database, credential)
            .await
            .map_err(|source| ProvisionError::CredentialCreationFailed {
                database: database.to_owned(),
                username: credential.username.clone(),
                source,
            })?;
        Ok(true)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::catalog::CatalogPreset;
    use crate::credentials::{Role, RoleGrant, UserInfo};
    use crate::in_memory::InMemoryAdmin;
    use tracing_test::traced_test;

    fn plan(catalog: TenantCatalog) -> ProvisionPlan {
        ProvisionPlan {
            replica_set: None,
            root_user: None,
            tenant_username: "admin".to_owned(),
            tenant_password: SecretString::from("admin"),
            catalog,
        }
    }

    fn users_only() -> TenantCatalog {
        TenantCatalog::new(vec![TenantSpec::new("users_db", "Users")]).unwrap()
    }

    #[tokio::test]
    async fn ensure_tenant_creates_credential_then_collection() {
        let admin = Arc::new(InMemoryAdmin::new());
        let provisioner = Provisioner::new(admin.clone(), plan(users_only()));

        let outcome = provisioner
            .ensure_tenant(&TenantSpec::new("users_db", "Users"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TenantProvisioned::Created {
                collections: vec!["Users".to_owned()]
            }
        );
        let users = admin.users("users_db");
        assert_eq!(users.len(), 1);
        assert!(users[0].has_role(Role::ReadWrite, "users_db"));
        assert_eq!(admin.collections("users_db"), ["Users"]);
    }

    #[tokio::test]
    async fn second_ensure_tenant_sends_no_mutations() {
        let admin = Arc::new(InMemoryAdmin::new());
        let provisioner = Provisioner::new(admin.clone(), plan(users_only()));
        let tenant = TenantSpec::new("users_db", "Users");

        provisioner.ensure_tenant(&tenant).await.unwrap();
        admin.reset_calls();

        let outcome = provisioner.ensure_tenant(&tenant).await.unwrap();
        assert_eq!(outcome, TenantProvisioned::AlreadyProvisioned);
        assert_eq!(admin.calls().mutations(), 0);
        assert_eq!(admin.users("users_db").len(), 1);
    }

    #[tokio::test]
    async fn existing_user_with_other_name_does_not_count() {
        let admin = Arc::new(InMemoryAdmin::new().with_user(
            "users_db",
            UserInfo {
                username: "reporting".to_owned(),
                db: "users_db".to_owned(),
                roles: vec![RoleGrant {
                    role: "read".to_owned(),
                    db: "users_db".to_owned(),
                }],
            },
        ));
        let provisioner = Provisioner::new(admin.clone(), plan(users_only()));

        let outcome = provisioner
            .ensure_tenant(&TenantSpec::new("users_db", "Users"))
            .await
            .unwrap();
        assert!(matches!(outcome, TenantProvisioned::Created { .. }));
        assert_eq!(admin.users("users_db").len(), 2);
    }

    #[tokio::test]
    async fn lookup_failure_skips_creation() {
        let admin = Arc::new(InMemoryAdmin::new().failing_lookup_on("users_db"));
        let provisioner = Provisioner::new(admin.clone(), plan(users_only()));

        let err = provisioner
            .ensure_tenant(&TenantSpec::new("users_db", "Users"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::CredentialLookupFailed { .. }));
        assert_eq!(admin.calls().mutations(), 0);
    }

    #[tokio::test]
    async fn collection_failure_stops_remaining_collections() {
        let admin = Arc::new(
            InMemoryAdmin::new().failing_collection_creation("posts_db", "RegisteredUsers"),
        );
        let provisioner = Provisioner::new(
            admin.clone(),
            plan(TenantCatalog::preset(CatalogPreset::Standalone)),
        );

        let tenant = TenantSpec::new("posts_db", "RegisteredUsers").with_collection("Posts");
        let err = provisioner.ensure_tenant(&tenant).await.unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::CollectionCreationFailed { ref collection, .. } if collection == "RegisteredUsers"
        ));
        assert_eq!(admin.calls().collection_creations.len(), 1);
        assert!(admin.collections("posts_db").is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn collection_failure_warns_that_rerun_skips_the_tenant() {
        let admin = Arc::new(InMemoryAdmin::new().failing_collection_creation("users_db", "Users"));
        let provisioner = Provisioner::new(admin.clone(), plan(users_only()));
        let cancel = CancellationToken::new();

        let first = provisioner.run(&cancel).await.unwrap();
        assert!(!first.is_complete());
        assert!(logs_contain("a re-run will skip this database"));
        assert!(!logs_contain("re-run to retry"));

        admin.clear_faults();
        let second = provisioner.run(&cancel).await.unwrap();
        assert!(matches!(
            second.tenants[0].result,
            Ok(TenantProvisioned::AlreadyProvisioned)
        ));
        assert!(admin.collections("users_db").is_empty());
    }

    #[tokio::test]
    async fn administrative_user_is_created_once() {
        let admin = Arc::new(InMemoryAdmin::new());
        let provisioner = Provisioner::new(admin.clone(), plan(users_only()));
        let root = CredentialSpec::root("admin", SecretString::from("admin"));

        assert_eq!(
            provisioner.ensure_administrative_user(&root).await.unwrap(),
            UserProvisioned::Created
        );
        assert_eq!(
            provisioner.ensure_administrative_user(&root).await.unwrap(),
            UserProvisioned::AlreadyExists
        );

        let users = admin.users(ADMIN_DATABASE);
        assert_eq!(users.len(), 1);
        assert!(users[0].has_role(Role::Root, ADMIN_DATABASE));
        assert_eq!(admin.calls().user_creations.len(), 1);
    }

    #[test]
    fn tenant_credential_is_scoped_to_its_database() {
        let plan = plan(users_only());
        let credential = plan.tenant_credential("search_db");
        assert_eq!(credential.scope, "search_db");
        assert_eq!(credential.role, Role::ReadWrite);
        assert_eq!(credential.username, "admin");
    }
}
