//! [`AdminChannel`] backed by the official MongoDB driver.

use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{self, Document, doc};
use mongodb::options::ClientOptions;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::admin::AdminChannel;
use crate::config::ConnectionConfig;
use crate::credentials::{ADMIN_DATABASE, CredentialSpec, RoleGrant, UserInfo};
use crate::error::AdminError;
use crate::topology::{MemberState, MemberStatus, ReplicaSetConfig, ReplicaSetStatus};

/// Admin channel talking to a single `mongod` node.
///
/// The connection is direct: replica-set discovery cannot work before the set is
/// initiated.
#[derive(Clone)]
pub struct MongoAdminChannel {
    client: Client,
}

impl MongoAdminChannel {
    /// Build a client for the configured node.
    ///
    /// The driver connects lazily, so an unreachable server only surfaces on the first
    /// command.
    ///
    /// # Errors
    /// Returns [`AdminError::Driver`] if the URI cannot be parsed.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, AdminError> {
        info!(app_name = %config.app_name, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(config.uri.as_str()).await?;
        options.app_name = Some(config.app_name.clone());
        options.direct_connection = Some(true);
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);

        let client = Client::with_options(options)?;
        Ok(Self { client })
    }

    async fn run_admin_command(&self, command: Document) -> Result<Document, AdminError> {
        let reply = self
            .client
            .database(ADMIN_DATABASE)
            .run_command(command)
            .await?;
        Ok(reply)
    }
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    ok: f64,
    set: Option<String>,
    #[serde(default)]
    members: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(rename = "_id")]
    id: i32,
    name: String,
    state: i32,
}

#[derive(Debug, Deserialize)]
struct RawUsersInfo {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    user: String,
    db: String,
    #[serde(default)]
    roles: Vec<RawRole>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    role: String,
    db: String,
}

fn parse_status(reply: Document) -> Result<ReplicaSetStatus, AdminError> {
    let raw: RawStatus = bson::from_document(reply)?;
    Ok(ReplicaSetStatus {
        set_name: raw.set,
        ok: raw.ok >= 1.0,
        members: raw
            .members
            .into_iter()
            .map(|m| MemberStatus {
                id: m.id,
                host: m.name,
                state: MemberState::from_code(m.state),
            })
            .collect(),
    })
}

fn parse_users(reply: Document) -> Result<Vec<UserInfo>, AdminError> {
    let raw: RawUsersInfo = bson::from_document(reply)?;
    Ok(raw
        .users
        .into_iter()
        .map(|u| UserInfo {
            username: u.user,
            db: u.db,
            roles: u
                .roles
                .into_iter()
                .map(|r| RoleGrant {
                    role: r.role,
                    db: r.db,
                })
                .collect(),
        })
        .collect())
}

fn initiate_command(config: &ReplicaSetConfig) -> Document {
    let members: Vec<Document> = config
        .members
        .iter()
        .map(|m| doc! { "_id": m.id, "host": m.host.as_str() })
        .collect();

    doc! {
        "replSetInitiate": {
            "_id": config.set_name.as_str(),
            "members": members,
        }
    }
}

fn create_user_command(credential: &CredentialSpec) -> Document {
    doc! {
        "createUser": credential.username.as_str(),
        "pwd": credential.password.expose_secret(),
        "roles": [
            { "role": credential.role.as_str(), "db": credential.scope.as_str() }
        ],
    }
}

#[async_trait]
impl AdminChannel for MongoAdminChannel {
    async fn replica_set_status(&self) -> Result<ReplicaSetStatus, AdminError> {
        let reply = self
            .run_admin_command(doc! { "replSetGetStatus": 1 })
            .await?;
        parse_status(reply)
    }

    async fn initiate_replica_set(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        debug!(set_name = %config.set_name, members = config.members.len(), "replSetInitiate");
        self.run_admin_command(initiate_command(config)).await?;
        Ok(())
    }

    async fn list_users(&self, database: &str) -> Result<Vec<UserInfo>, AdminError> {
        let reply = self
            .client
            .database(database)
            .run_command(doc! { "usersInfo": 1 })
            .await?;
        parse_users(reply)
    }

    async fn create_user(
        &self,
        database: &str,
        credential: &CredentialSpec,
    ) -> Result<(), AdminError> {
        debug!(database, username = %credential.username, role = %credential.role, "createUser");
        self.client
            .database(database)
            .run_command(create_user_command(credential))
            .await?;
        Ok(())
    }

    async fn create_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<(), AdminError> {
        debug!(database, collection, "create");
        self.client
            .database(database)
            .create_collection(collection)
            .await?;
        Ok(())
    }
}
