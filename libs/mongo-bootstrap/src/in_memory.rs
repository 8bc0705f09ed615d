//! In-process [`AdminChannel`] that simulates a server and records every call.
//!
//! Used by the test suites to observe exactly which mutations a provisioning run
//! issues, and to inject the failure modes a real deployment produces.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::admin::AdminChannel;
use crate::credentials::{CredentialSpec, RoleGrant, UserInfo};
use crate::error::AdminError;
use crate::topology::{MemberState, MemberStatus, ReplicaSetConfig, ReplicaSetStatus};

/// Every call the channel received, in order per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub status_queries: usize,
    pub initiations: Vec<ReplicaSetConfig>,
    pub user_lookups: Vec<String>,
    /// `(database, username)`
    pub user_creations: Vec<(String, String)>,
    /// `(database, collection)`
    pub collection_creations: Vec<(String, String)>,
}

impl CallLog {
    /// Number of user and collection creations.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.user_creations.len() + self.collection_creations.len()
    }
}

#[derive(Debug, Clone)]
enum ReplicaState {
    Uninitialized { election_polls: u32 },
    Electing { polls_remaining: u32, config: ReplicaSetConfig },
    Ready { config: ReplicaSetConfig },
    NoPrimary { config: ReplicaSetConfig },
    /// Initiated, but the status command answers with `ok: 0`.
    Degraded { config: ReplicaSetConfig },
}

#[derive(Debug, Default)]
struct Database {
    users: Vec<UserInfo>,
    collections: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Faults {
    initiate: bool,
    lookup: HashSet<String>,
    user_creation: HashSet<String>,
    collection_creation: HashSet<(String, String)>,
}

#[derive(Debug)]
struct State {
    replica: ReplicaState,
    databases: BTreeMap<String, Database>,
    faults: Faults,
    calls: CallLog,
}

#[derive(Debug)]
pub struct InMemoryAdmin {
    state: Mutex<State>,
}

impl Default for InMemoryAdmin {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAdmin {
    /// An initiated replica set with an elected primary and no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::with_replica(ReplicaState::Ready {
            config: ReplicaSetConfig::default(),
        })
    }

    /// A node whose replica set was never initiated. After a successful initiate,
    /// `election_polls` status queries report an election in progress before the
    /// first member becomes primary.
    #[must_use]
    pub fn uninitialized(election_polls: u32) -> Self {
        Self::with_replica(ReplicaState::Uninitialized { election_polls })
    }

    fn with_replica(replica: ReplicaState) -> Self {
        Self {
            state: Mutex::new(State {
                replica,
                databases: BTreeMap::new(),
                faults: Faults::default(),
                calls: CallLog::default(),
            }),
        }
    }

    /// Status answers succeed but no member ever becomes primary.
    #[must_use]
    pub fn never_elects(self) -> Self {
        {
            let mut state = self.state.lock();
            let config = match &state.replica {
                ReplicaState::Electing { config, .. }
                | ReplicaState::Ready { config }
                | ReplicaState::NoPrimary { config }
                | ReplicaState::Degraded { config } => config.clone(),
                ReplicaState::Uninitialized { .. } => ReplicaSetConfig::default(),
            };
            state.replica = ReplicaState::NoPrimary { config };
        }
        self
    }

    /// An initiated set whose status reply reports `ok: 0` with no primary.
    #[must_use]
    pub fn degraded() -> Self {
        Self::with_replica(ReplicaState::Degraded {
            config: ReplicaSetConfig::default(),
        })
    }

    #[must_use]
    pub fn failing_initiate(self) -> Self {
        self.state.lock().faults.initiate = true;
        self
    }

    #[must_use]
    pub fn failing_lookup_on(self, database: &str) -> Self {
        self.state.lock().faults.lookup.insert(database.to_owned());
        self
    }

    #[must_use]
    pub fn failing_user_creation_on(self, database: &str) -> Self {
        self.state
            .lock()
            .faults
            .user_creation
            .insert(database.to_owned());
        self
    }

    #[must_use]
    pub fn failing_collection_creation(self, database: &str, collection: &str) -> Self {
        self.state
            .lock()
            .faults
            .collection_creation
            .insert((database.to_owned(), collection.to_owned()));
        self
    }

    /// Pre-existing user, as left behind by an earlier run.
    #[must_use]
    pub fn with_user(self, database: &str, user: UserInfo) -> Self {
        self.state
            .lock()
            .databases
            .entry(database.to_owned())
            .or_default()
            .users
            .push(user);
        self
    }

    /// Remove all injected faults, e.g. to simulate an operator re-run.
    pub fn clear_faults(&self) {
        self.state.lock().faults = Faults::default();
    }

    #[must_use]
    pub fn calls(&self) -> CallLog {
        self.state.lock().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls = CallLog::default();
    }

    #[must_use]
    pub fn users(&self, database: &str) -> Vec<UserInfo> {
        self.state
            .lock()
            .databases
            .get(database)
            .map(|db| db.users.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn collections(&self, database: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(database)
            .map(|db| db.collections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Databases that hold at least one collection; empty ones do not exist yet.
    #[must_use]
    pub fn materialized_databases(&self) -> Vec<String> {
        self.state
            .lock()
            .databases
            .iter()
            .filter(|(_, db)| !db.collections.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn member_statuses(config: &ReplicaSetConfig, primary: Option<i32>) -> Vec<MemberStatus> {
    config
        .members
        .iter()
        .map(|m| MemberStatus {
            id: m.id,
            host: m.host.clone(),
            state: if Some(m.id) == primary {
                MemberState::Primary
            } else {
                MemberState::Secondary
            },
        })
        .collect()
}

fn ready_status(config: &ReplicaSetConfig, primary: Option<i32>) -> ReplicaSetStatus {
    ReplicaSetStatus {
        set_name: Some(config.set_name.clone()),
        ok: true,
        members: member_statuses(config, primary),
    }
}

#[async_trait]
impl AdminChannel for InMemoryAdmin {
    async fn replica_set_status(&self) -> Result<ReplicaSetStatus, AdminError> {
        let mut state = self.state.lock();
        state.calls.status_queries += 1;

        match state.replica.clone() {
            ReplicaState::Uninitialized { .. } => Err(AdminError::command(
                94,
                "NotYetInitialized",
                "no replset config has been received",
            )),
            ReplicaState::Electing {
                polls_remaining: 0,
                config,
            } => {
                let primary = config.members.first().map(|m| m.id);
                let status = ready_status(&config, primary);
                state.replica = ReplicaState::Ready { config };
                Ok(status)
            }
            ReplicaState::Electing {
                polls_remaining,
                config,
            } => {
                let status = ReplicaSetStatus {
                    set_name: Some(config.set_name.clone()),
                    ok: true,
                    members: config
                        .members
                        .iter()
                        .map(|m| MemberStatus {
                            id: m.id,
                            host: m.host.clone(),
                            state: MemberState::Startup2,
                        })
                        .collect(),
                };
                state.replica = ReplicaState::Electing {
                    polls_remaining: polls_remaining - 1,
                    config,
                };
                Ok(status)
            }
            ReplicaState::Ready { config } => {
                let primary = config.members.first().map(|m| m.id);
                Ok(ready_status(&config, primary))
            }
            ReplicaState::NoPrimary { config } => Ok(ready_status(&config, None)),
            ReplicaState::Degraded { config } => Ok(ReplicaSetStatus {
                ok: false,
                ..ready_status(&config, None)
            }),
        }
    }

    async fn initiate_replica_set(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        let mut state = self.state.lock();
        state.calls.initiations.push(config.clone());

        if state.faults.initiate {
            return Err(AdminError::command(
                93,
                "InvalidReplicaSetConfig",
                "member is not reachable",
            ));
        }

        let ReplicaState::Uninitialized { election_polls } = state.replica.clone() else {
            return Err(AdminError::command(
                23,
                "AlreadyInitialized",
                "already initialized",
            ));
        };
        state.replica = ReplicaState::Electing {
            polls_remaining: election_polls,
            config: config.clone(),
        };
        Ok(())
    }

    async fn list_users(&self, database: &str) -> Result<Vec<UserInfo>, AdminError> {
        let mut state = self.state.lock();
        state.calls.user_lookups.push(database.to_owned());

        if state.faults.lookup.contains(database) {
            return Err(AdminError::command(13, "Unauthorized", "not authorized"));
        }

        Ok(state
            .databases
            .get(database)
            .map(|db| db.users.clone())
            .unwrap_or_default())
    }

    async fn create_user(
        &self,
        database: &str,
        credential: &CredentialSpec,
    ) -> Result<(), AdminError> {
        let mut state = self.state.lock();
        state
            .calls
            .user_creations
            .push((database.to_owned(), credential.username.clone()));

        if state.faults.user_creation.contains(database) {
            return Err(AdminError::command(13, "Unauthorized", "not authorized"));
        }

        let db = state.databases.entry(database.to_owned()).or_default();
        if db.users.iter().any(|u| u.username == credential.username) {
            return Err(AdminError::command(
                51003,
                "Location51003",
                format!("User \"{}@{database}\" already exists", credential.username),
            ));
        }
        db.users.push(UserInfo {
            username: credential.username.clone(),
            db: database.to_owned(),
            roles: vec![RoleGrant {
                role: credential.role.as_str().to_owned(),
                db: credential.scope.clone(),
            }],
        });
        Ok(())
    }

    async fn create_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<(), AdminError> {
        let mut state = self.state.lock();
        state
            .calls
            .collection_creations
            .push((database.to_owned(), collection.to_owned()));

        if state
            .faults
            .collection_creation
            .contains(&(database.to_owned(), collection.to_owned()))
        {
            return Err(AdminError::command(
                11600,
                "InterruptedAtShutdown",
                "interrupted at shutdown",
            ));
        }

        let db = state.databases.entry(database.to_owned()).or_default();
        if !db.collections.insert(collection.to_owned()) {
            return Err(AdminError::command(
                48,
                "NamespaceExists",
                format!("Collection {database}.{collection} already exists."),
            ));
        }
        Ok(())
    }
}
