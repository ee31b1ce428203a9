//! Schema store abstraction
//!
//! The provisioner reads and mutates database metadata only through
//! [`SchemaStore`], so the reconcile logic runs the same against MongoDB and
//! against the in-memory store used in tests and rehearsals.

use bson::Document;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;

use crate::db::schemas::{CappedStorage, CollectionSpec, IndexSpec, RoleGrant, UserSpec};
use crate::types::{ProvisionError, Result};

/// A user as it currently exists on the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserState {
    pub name: String,
    pub roles: BTreeSet<RoleGrant>,
}

/// A collection as it currently exists on the server
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionState {
    pub name: String,
    pub validator: Option<Document>,
    pub storage: Option<CappedStorage>,
}

/// An index as it currently exists on the server
#[derive(Clone, Debug, PartialEq)]
pub struct IndexState {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
}

/// Trait for reading and applying schema metadata (allows mocking in tests)
#[async_trait::async_trait]
pub trait SchemaStore: Send + Sync {
    /// Look up a user on its authentication database
    async fn find_user(&self, auth_db: &str, name: &str) -> Result<Option<UserState>>;

    async fn create_user(&self, user: &UserSpec) -> Result<()>;

    /// Replace the user's role set
    async fn update_user_roles(&self, user: &UserSpec) -> Result<()>;

    async fn find_collection(&self, name: &str) -> Result<Option<CollectionState>>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Replace the validator of an existing collection
    async fn set_validator(&self, name: &str, validator: &Document) -> Result<()>;

    /// Indexes on a collection; empty if the collection does not exist
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexState>>;

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryState {
    users: HashMap<(String, String), UserState>,
    collections: HashMap<String, CollectionState>,
    indexes: HashMap<String, Vec<IndexState>>,
    /// Fields holding duplicate values per collection
    duplicates: HashMap<String, HashSet<String>>,
    /// Mutating calls in order, for assertions
    mutations: Vec<String>,
}

/// In-memory schema store that mimics the server's create semantics
#[derive(Default)]
pub struct InMemorySchemaStore {
    state: RwLock<MemoryState>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend existing documents in `collection` share values of `field`,
    /// so a unique index on it cannot be built
    pub async fn seed_duplicates(&self, collection: &str, field: &str) {
        self.state
            .write()
            .await
            .duplicates
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
    }

    pub async fn seed_user(&self, auth_db: &str, state: UserState) {
        self.state
            .write()
            .await
            .users
            .insert((auth_db.to_string(), state.name.clone()), state);
    }

    pub async fn seed_collection(&self, state: CollectionState) {
        let mut guard = self.state.write().await;
        guard.indexes.entry(state.name.clone()).or_default();
        guard.collections.insert(state.name.clone(), state);
    }

    pub async fn seed_index(&self, collection: &str, index: IndexState) {
        self.state
            .write()
            .await
            .indexes
            .entry(collection.to_string())
            .or_default()
            .push(index);
    }

    /// Mutating calls seen so far, e.g. `create_collection:products`
    pub async fn mutations(&self) -> Vec<String> {
        self.state.read().await.mutations.clone()
    }
}

#[async_trait::async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn find_user(&self, auth_db: &str, name: &str) -> Result<Option<UserState>> {
        let key = (auth_db.to_string(), name.to_string());
        Ok(self.state.read().await.users.get(&key).cloned())
    }

    async fn create_user(&self, user: &UserSpec) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (user.auth_db.clone(), user.name.clone());
        if state.users.contains_key(&key) {
            return Err(ProvisionError::AlreadyExists(format!(
                "User \"{}@{}\" already exists",
                user.name, user.auth_db
            )));
        }
        state.users.insert(
            key,
            UserState {
                name: user.name.clone(),
                roles: user.roles.clone(),
            },
        );
        state.mutations.push(format!("create_user:{}", user.name));
        Ok(())
    }

    async fn update_user_roles(&self, user: &UserSpec) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (user.auth_db.clone(), user.name.clone());
        let existing = state.users.get_mut(&key).ok_or_else(|| {
            ProvisionError::Database(format!("Could not find user \"{}\"", user.name))
        })?;
        existing.roles = user.roles.clone();
        state.mutations.push(format!("update_user_roles:{}", user.name));
        Ok(())
    }

    async fn find_collection(&self, name: &str) -> Result<Option<CollectionState>> {
        Ok(self.state.read().await.collections.get(name).cloned())
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut state = self.state.write().await;
        if state.collections.contains_key(&spec.name) {
            return Err(ProvisionError::AlreadyExists(format!(
                "Collection already exists. NS: {}",
                spec.name
            )));
        }
        state.collections.insert(
            spec.name.clone(),
            CollectionState {
                name: spec.name.clone(),
                validator: spec.validator.clone(),
                storage: spec.storage,
            },
        );
        state.indexes.entry(spec.name.clone()).or_default();
        state.mutations.push(format!("create_collection:{}", spec.name));
        Ok(())
    }

    async fn set_validator(&self, name: &str, validator: &Document) -> Result<()> {
        let mut state = self.state.write().await;
        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| ProvisionError::Database(format!("ns does not exist: {}", name)))?;
        collection.validator = Some(validator.clone());
        state.mutations.push(format!("set_validator:{}", name));
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexState>> {
        Ok(self
            .state
            .read()
            .await
            .indexes
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<()> {
        let mut state = self.state.write().await;

        if index.unique {
            let has_duplicates = state.duplicates.get(collection).is_some_and(|fields| {
                index.keys.iter().any(|(field, _)| fields.contains(field))
            });
            if has_duplicates {
                return Err(ProvisionError::ConstraintViolation(format!(
                    "E11000 duplicate key error collection: {} index: {}",
                    collection,
                    index.name()
                )));
            }
        }

        // Creating a collection implicitly, as the server does
        if !state.collections.contains_key(collection) {
            state.collections.insert(
                collection.to_string(),
                CollectionState {
                    name: collection.to_string(),
                    validator: None,
                    storage: None,
                },
            );
        }

        let indexes = state.indexes.entry(collection.to_string()).or_default();
        if !indexes.iter().any(|i| index.matches_keys(&i.keys)) {
            indexes.push(IndexState {
                name: index.name(),
                keys: index.keys_document(),
                unique: index.unique,
            });
        }
        state
            .mutations
            .push(format!("create_index:{}.{}", collection, index.name()));
        Ok(())
    }
}
