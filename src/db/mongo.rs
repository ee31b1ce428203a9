//! MongoDB client and schema store
//!
//! Implements [`SchemaStore`] with the server's administrative commands
//! (`usersInfo`, `createUser`, `create`, `collMod`, `createIndexes`).

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{options::ClientOptions, Client, Database};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::redact_uri;
use crate::db::schemas::{CappedStorage, CollectionSpec, IndexSpec, RoleGrant, UserSpec};
use crate::db::store::{CollectionState, IndexState, SchemaStore, UserState};
use crate::types::error::codes;
use crate::types::{ProvisionError, Result};

/// MongoDB client wrapper bound to the target database
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

/// Parse the URI and fill in timeouts the URI leaves unset, so an
/// unreachable server fails fast
async fn client_options(uri: &str, timeout: Duration) -> Result<ClientOptions> {
    let mut options = ClientOptions::parse(uri).await.map_err(|e| {
        ProvisionError::Config(format!("Invalid MongoDB URI {}: {}", redact_uri(uri), e))
    })?;

    options.server_selection_timeout.get_or_insert(timeout);
    options.connect_timeout.get_or_insert(timeout);
    Ok(options)
}

impl MongoClient {
    /// Connect and verify the server answers a ping
    pub async fn new(uri: &str, db_name: &str, timeout: Duration) -> Result<Self> {
        info!("Connecting to MongoDB at {}", redact_uri(uri));

        let options = client_options(uri, timeout).await?;
        let client = Client::with_options(options)
            .map_err(|e| ProvisionError::Config(format!("Invalid MongoDB options: {}", e)))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ProvisionError::ConnectionFailure(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB, target database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.db_name)
    }
}

#[derive(Deserialize)]
struct UsersInfoReply {
    users: Vec<UserInfo>,
}

#[derive(Deserialize)]
struct UserInfo {
    user: String,
    #[serde(default)]
    roles: Vec<RoleGrant>,
}

fn is_namespace_not_found(err: &mongodb::error::Error) -> bool {
    ProvisionError::server_code(err) == Some(codes::NAMESPACE_NOT_FOUND)
}

#[async_trait::async_trait]
impl SchemaStore for MongoClient {
    async fn find_user(&self, auth_db: &str, name: &str) -> Result<Option<UserState>> {
        let reply = self
            .client
            .database(auth_db)
            .run_command(doc! { "usersInfo": { "user": name, "db": auth_db } })
            .await?;
        let reply: UsersInfoReply = bson::from_document(reply)?;

        Ok(reply
            .users
            .into_iter()
            .find(|u| u.user == name)
            .map(|u| UserState {
                name: u.user,
                roles: u.roles.into_iter().collect::<BTreeSet<_>>(),
            }))
    }

    async fn create_user(&self, user: &UserSpec) -> Result<()> {
        debug!("createUser {} on {}", user.name, user.auth_db);
        self.client
            .database(&user.auth_db)
            .run_command(user.create_command())
            .await?;
        Ok(())
    }

    async fn update_user_roles(&self, user: &UserSpec) -> Result<()> {
        debug!("updateUser {} on {}", user.name, user.auth_db);
        self.client
            .database(&user.auth_db)
            .run_command(user.update_roles_command())
            .await?;
        Ok(())
    }

    async fn find_collection(&self, name: &str) -> Result<Option<CollectionState>> {
        let mut cursor = self
            .database()
            .list_collections()
            .filter(doc! { "name": name })
            .await?;

        let Some(spec) = cursor.try_next().await? else {
            return Ok(None);
        };

        let options = spec.options;
        let storage = match (options.capped, options.size) {
            (Some(true), Some(size_bytes)) => Some(CappedStorage {
                size_bytes,
                max_documents: options.max.filter(|max| *max > 0),
            }),
            _ => None,
        };

        Ok(Some(CollectionState {
            name: spec.name,
            validator: options.validator,
            storage,
        }))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        debug!("create {}", spec.name);
        self.database().run_command(spec.create_command()).await?;
        Ok(())
    }

    async fn set_validator(&self, name: &str, validator: &Document) -> Result<()> {
        debug!("collMod {}", name);
        self.database()
            .run_command(doc! { "collMod": name, "validator": validator.clone() })
            .await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexState>> {
        let cursor = match self
            .database()
            .collection::<Document>(collection)
            .list_indexes()
            .await
        {
            Ok(cursor) => cursor,
            Err(e) if is_namespace_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let models: Vec<_> = cursor.try_collect().await?;

        Ok(models
            .into_iter()
            .map(|model| {
                let options = model.options.unwrap_or_default();
                IndexState {
                    name: options.name.unwrap_or_default(),
                    keys: model.keys,
                    unique: options.unique.unwrap_or(false),
                }
            })
            .collect())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<()> {
        debug!("createIndexes {}.{}", collection, index.name());
        self.database()
            .collection::<Document>(collection)
            .create_index(index.to_model())
            .await?;
        Ok(())
    }
}
