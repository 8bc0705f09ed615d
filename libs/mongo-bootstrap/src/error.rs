//! Error types for the admin channel and the provisioning stages.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by an [`AdminChannel`](crate::AdminChannel) call.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The server rejected the command.
    #[error("command failed with code {code} ({code_name}): {message}")]
    Command {
        code: i32,
        code_name: String,
        message: String,
    },

    /// The server answered with a document we could not interpret.
    #[error("unexpected server response: {0}")]
    Decode(String),

    /// Transport or driver level failure.
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
}

impl AdminError {
    pub(crate) fn command(code: i32, code_name: &str, message: impl Into<String>) -> Self {
        Self::Command {
            code,
            code_name: code_name.to_owned(),
            message: message.into(),
        }
    }
}

impl From<mongodb::bson::de::Error> for AdminError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors raised while provisioning.
///
/// Variants fall in two classes: stage-fatal errors halt the whole run, tenant-local
/// errors only affect the database they were raised for. See
/// [`ProvisionError::is_stage_fatal`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to initiate replica set '{set_name}': {source}")]
    ReplicaSetInitiationFailed {
        set_name: String,
        #[source]
        source: AdminError,
    },

    #[error("primary not found in time: gave up after {attempts} attempts ({waited:?})")]
    PrimaryElectionTimeout { attempts: u32, waited: Duration },

    #[error("provisioning cancelled")]
    Cancelled,

    #[error("failed to look up credentials on '{database}': {source}")]
    CredentialLookupFailed {
        database: String,
        #[source]
        source: AdminError,
    },

    #[error("failed to create user '{username}' on '{database}': {source}")]
    CredentialCreationFailed {
        database: String,
        username: String,
        #[source]
        source: AdminError,
    },

    #[error("failed to create collection '{collection}' in '{database}': {source}")]
    CollectionCreationFailed {
        database: String,
        collection: String,
        #[source]
        source: AdminError,
    },
}

impl ProvisionError {
    /// Whether this error halts the run instead of affecting a single tenant.
    #[must_use]
    pub fn is_stage_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReplicaSetInitiationFailed { .. }
                | Self::PrimaryElectionTimeout { .. }
                | Self::Cancelled
        )
    }

    /// Database the error is scoped to, for tenant-local errors.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::CredentialLookupFailed { database, .. }
            | Self::CredentialCreationFailed { database, .. }
            | Self::CollectionCreationFailed { database, .. } => Some(database),
            Self::ReplicaSetInitiationFailed { .. }
            | Self::PrimaryElectionTimeout { .. }
            | Self::Cancelled => None,
        }
    }
}
