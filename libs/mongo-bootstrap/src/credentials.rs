//! Database users: the ones we create and the ones we find.

use std::fmt;

use secrecy::SecretString;

/// Database the root credential lives on.
pub const ADMIN_DATABASE: &str = "admin";

/// Built-in roles granted by the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ReadWrite,
    Root,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadWrite => "readWrite",
            Self::Root => "root",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role assignment `{ role, db }` as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

/// A user already defined on some database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub db: String,
    pub roles: Vec<RoleGrant>,
}

impl UserInfo {
    #[must_use]
    pub fn has_role(&self, role: Role, db: &str) -> bool {
        self.roles.iter().any(|g| g.role == role.as_str() && g.db == db)
    }
}

/// A user to create: one role on one database.
#[derive(Clone)]
pub struct CredentialSpec {
    pub username: String,
    pub password: SecretString,
    pub role: Role,
    /// Database the role is scoped to.
    pub scope: String,
}

impl CredentialSpec {
    /// Read-write credential limited to `database`.
    #[must_use]
    pub fn read_write(
        username: impl Into<String>,
        password: SecretString,
        database: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password,
            role: Role::ReadWrite,
            scope: database.into(),
        }
    }

    /// Root credential on the `admin` database.
    #[must_use]
    pub fn root(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            role: Role::Root,
            scope: ADMIN_DATABASE.to_owned(),
        }
    }
}

impl fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSpec")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_password() {
        let spec = CredentialSpec::read_write("admin", SecretString::from("hunter2"), "users_db");
        let dbg = format!("{spec:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("users_db"));
    }

    #[test]
    fn root_is_scoped_to_admin() {
        let spec = CredentialSpec::root("admin", SecretString::from("admin"));
        assert_eq!(spec.scope, ADMIN_DATABASE);
        assert_eq!(spec.role.as_str(), "root");
    }

    #[test]
    fn has_role_matches_role_and_db() {
        let user = UserInfo {
            username: "admin".to_owned(),
            db: "posts_db".to_owned(),
            roles: vec![RoleGrant {
                role: "readWrite".to_owned(),
                db: "posts_db".to_owned(),
            }],
        };
        assert!(user.has_role(Role::ReadWrite, "posts_db"));
        assert!(!user.has_role(Role::ReadWrite, "users_db"));
        assert!(!user.has_role(Role::Root, "posts_db"));
    }
}
