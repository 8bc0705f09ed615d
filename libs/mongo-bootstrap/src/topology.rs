//! Replica-set descriptors and status snapshots.

use serde::{Deserialize, Serialize};

/// Default replica-set identifier.
pub const DEFAULT_SET_NAME: &str = "rs0";

/// Desired replica-set topology, as sent with the initiate command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetConfig {
    pub set_name: String,
    pub members: Vec<ReplicaMember>,
}

impl Default for ReplicaSetConfig {
    fn default() -> Self {
        Self {
            set_name: DEFAULT_SET_NAME.to_owned(),
            members: vec![
                ReplicaMember::new(
                    0,
                    "shared-mongodb-0.shared-mongodb.tinyx.svc.cluster.local:27017",
                ),
                ReplicaMember::new(
                    1,
                    "shared-mongodb-1.shared-mongodb.tinyx.svc.cluster.local:27017",
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaMember {
    pub id: i32,
    pub host: String,
}

impl ReplicaMember {
    #[must_use]
    pub fn new(id: i32, host: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
        }
    }
}

/// Member state as reported by `replSetGetStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Startup,
    Primary,
    Secondary,
    Recovering,
    Startup2,
    Unknown,
    Arbiter,
    Down,
    Rollback,
    Removed,
    Other(i32),
}

impl MemberState {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Startup,
            1 => Self::Primary,
            2 => Self::Secondary,
            3 => Self::Recovering,
            5 => Self::Startup2,
            6 => Self::Unknown,
            7 => Self::Arbiter,
            8 => Self::Down,
            9 => Self::Rollback,
            10 => Self::Removed,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Startup => 0,
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Recovering => 3,
            Self::Startup2 => 5,
            Self::Unknown => 6,
            Self::Arbiter => 7,
            Self::Down => 8,
            Self::Rollback => 9,
            Self::Removed => 10,
            Self::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    pub id: i32,
    pub host: String,
    pub state: MemberState,
}

/// Snapshot of a replica set returned by a successful status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetStatus {
    pub set_name: Option<String>,
    pub ok: bool,
    pub members: Vec<MemberStatus>,
}

impl ReplicaSetStatus {
    /// First member currently in the PRIMARY state.
    #[must_use]
    pub fn primary(&self) -> Option<&MemberStatus> {
        self.members.iter().find(|m| m.state == MemberState::Primary)
    }
}
