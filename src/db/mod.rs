//! Database layer for the provisioner
//!
//! Collection/user declarations, the schema store abstraction, and its
//! MongoDB implementation.

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::MongoClient;
pub use schemas::{declared_collections, CollectionSpec, IndexSpec, UserSpec};
pub use store::{CollectionState, InMemorySchemaStore, IndexState, SchemaStore, UserState};
