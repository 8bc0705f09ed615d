//! The administrative control channel to the database server.

use async_trait::async_trait;

use crate::credentials::{CredentialSpec, UserInfo};
use crate::error::AdminError;
use crate::topology::{ReplicaSetConfig, ReplicaSetStatus};

/// Administrative operations the provisioner needs from the server.
///
/// Per-database operations name their target database explicitly; implementations
/// must not keep a "current database" between calls.
#[async_trait]
pub trait AdminChannel: Send + Sync {
    /// Current replica-set status. An error means the set is not initialized or the
    /// node cannot answer yet.
    async fn replica_set_status(&self) -> Result<ReplicaSetStatus, AdminError>;

    async fn initiate_replica_set(&self, config: &ReplicaSetConfig) -> Result<(), AdminError>;

    /// Users defined on `database`.
    async fn list_users(&self, database: &str) -> Result<Vec<UserInfo>, AdminError>;

    /// Create `credential` on `database`.
    async fn create_user(
        &self,
        database: &str,
        credential: &CredentialSpec,
    ) -> Result<(), AdminError>;

    async fn create_collection(&self, database: &str, collection: &str)
    -> Result<(), AdminError>;
}
