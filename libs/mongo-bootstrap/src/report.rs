//! Outcome of a provisioning run.

use crate::error::ProvisionError;
use crate::replica_set::ReplicaSetReadiness;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantProvisioned {
    /// Credential and collections were created by this run.
    Created { collections: Vec<String> },
    /// The administrative credential was already present; nothing was sent.
    AlreadyProvisioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserProvisioned {
    Created,
    AlreadyExists,
}

#[derive(Debug)]
pub struct TenantReport {
    pub database: String,
    pub result: Result<TenantProvisioned, ProvisionError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaSetStage {
    /// Replica-set handling is disabled for this deployment.
    Skipped,
    Ready {
        readiness: ReplicaSetReadiness,
        primary: String,
    },
}

#[derive(Debug)]
pub struct ProvisionReport {
    pub replica_set: ReplicaSetStage,
    /// `None` when the root user is disabled.
    pub root_user: Option<Result<UserProvisioned, ProvisionError>>,
    pub tenants: Vec<TenantReport>,
}

impl ProvisionReport {
    /// Tenant-local failures, root user included.
    pub fn failures(&self) -> impl Iterator<Item = &ProvisionError> {
        self.root_user
            .iter()
            .filter_map(|r| r.as_ref().err())
            .chain(self.tenants.iter().filter_map(|t| t.result.as_ref().err()))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    #[must_use]
    pub fn created_tenants(&self) -> usize {
        self.tenants
            .iter()
            .filter(|t| matches!(t.result, Ok(TenantProvisioned::Created { .. })))
            .count()
    }

    #[must_use]
    pub fn existing_tenants(&self) -> usize {
        self.tenants
            .iter()
            .filter(|t| matches!(t.result, Ok(TenantProvisioned::AlreadyProvisioned)))
            .count()
    }
}
