//! Application user declaration
//!
//! The database user the storefront services authenticate as, together with
//! the role grants it needs on the target database.

use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single `{ role, db }` grant
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: &str, db: &str) -> Self {
        Self {
            role: role.to_string(),
            db: db.to_string(),
        }
    }

    fn to_bson(&self) -> Bson {
        Bson::Document(doc! { "role": self.role.as_str(), "db": self.db.as_str() })
    }
}

impl fmt::Display for RoleGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.db)
    }
}

/// Declared database user
#[derive(Clone)]
pub struct UserSpec {
    pub name: String,
    /// Database the user is defined on (usually `admin`)
    pub auth_db: String,
    password: String,
    pub roles: BTreeSet<RoleGrant>,
}

impl UserSpec {
    pub fn new(name: String, auth_db: String, password: String, roles: BTreeSet<RoleGrant>) -> Self {
        Self {
            name,
            auth_db,
            password,
            roles,
        }
    }

    /// The storefront application user: read/write plus schema administration
    /// on the target database
    pub fn application(name: String, auth_db: String, password: String, target_db: &str) -> Self {
        let roles = [
            RoleGrant::new("readWrite", target_db),
            RoleGrant::new("dbAdmin", target_db),
        ]
        .into_iter()
        .collect();

        Self::new(name, auth_db, password, roles)
    }

    fn roles_bson(&self) -> Vec<Bson> {
        self.roles.iter().map(RoleGrant::to_bson).collect()
    }

    /// `createUser` command, to be run against `auth_db`
    pub fn create_command(&self) -> Document {
        doc! {
            "createUser": self.name.as_str(),
            "pwd": self.password.as_str(),
            "roles": self.roles_bson(),
        }
    }

    /// `updateUser` command replacing the role set; the password is untouched
    pub fn update_roles_command(&self) -> Document {
        doc! {
            "updateUser": self.name.as_str(),
            "roles": self.roles_bson(),
        }
    }

    pub fn roles_display(&self) -> String {
        self.roles
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// Never print the credential
impl fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpec")
            .field("name", &self.name)
            .field("auth_db", &self.auth_db)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}
