//! Declarative collection and index specifications
//!
//! Each document schema describes its collection through [`CollectionSchema`];
//! the provisioner only ever sees the resulting [`CollectionSpec`] values.

use bson::{Bson, Document};
use mongodb::{options::IndexOptions, IndexModel};
use serde::Serialize;
use std::fmt;

/// Trait for document schemas that declare their own collection
pub trait CollectionSchema {
    /// Collection name
    const COLLECTION: &'static str;

    /// `$jsonSchema`-based validator, if writes should be checked
    fn validator() -> Option<Document> {
        None
    }

    /// Capped storage limits, if the collection is a ring buffer
    fn storage() -> Option<CappedStorage> {
        None
    }

    /// Secondary indexes
    fn indexes() -> Vec<IndexSpec>;
}

/// Sort direction of an index key
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    /// Read a direction from a key document value as stored by the server
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let n = match value {
            Bson::Int32(n) => *n as f64,
            Bson::Int64(n) => *n as f64,
            Bson::Double(n) => *n,
            _ => return None,
        };
        if n > 0.0 {
            Some(Self::Ascending)
        } else if n < 0.0 {
            Some(Self::Descending)
        } else {
            None
        }
    }
}

/// Secondary index declaration
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: Vec<(String, IndexDirection)>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn ascending(field: &str) -> Self {
        Self::compound(&[(field, IndexDirection::Ascending)])
    }

    pub fn descending(field: &str) -> Self {
        Self::compound(&[(field, IndexDirection::Descending)])
    }

    pub fn compound(keys: &[(&str, IndexDirection)]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|(field, dir)| (field.to_string(), *dir))
                .collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Server-default index name, e.g. `entityType_1_entityId_1`
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Key specification as sent to `createIndexes`
    pub fn keys_document(&self) -> Document {
        let mut keys = Document::new();
        for (field, dir) in &self.keys {
            keys.insert(field.clone(), dir.as_i32());
        }
        keys
    }

    /// Whether a key document read back from the server matches these keys.
    /// Field order is significant for compound indexes.
    pub fn matches_keys(&self, keys: &Document) -> bool {
        keys.len() == self.keys.len()
            && keys.iter().zip(&self.keys).all(|((field, value), (want, dir))| {
                field == want && IndexDirection::from_bson(value) == Some(*dir)
            })
    }

    pub fn to_model(&self) -> IndexModel {
        let mut options = IndexOptions::builder().name(self.name()).build();
        if self.unique {
            options.unique = Some(true);
        }

        IndexModel::builder()
            .keys(self.keys_document())
            .options(options)
            .build()
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if self.unique {
            write!(f, " (unique)")?;
        }
        Ok(())
    }
}

/// Capped collection limits
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CappedStorage {
    /// Maximum total size in bytes
    pub size_bytes: u64,
    /// Maximum number of documents
    pub max_documents: Option<u64>,
}

/// Everything the provisioner needs to know about one collection
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub validator: Option<Document>,
    pub storage: Option<CappedStorage>,
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSpec {
    pub fn of<T: CollectionSchema>() -> Self {
        Self {
            name: T::COLLECTION.to_string(),
            validator: T::validator(),
            storage: T::storage(),
            indexes: T::indexes(),
        }
    }

    /// `create` command for this collection
    pub fn create_command(&self) -> Document {
        let mut command = bson::doc! { "create": self.name.as_str() };
        if let Some(validator) = &self.validator {
            command.insert("validator", validator.clone());
        }
        if let Some(storage) = &self.storage {
            command.insert("capped", true);
            command.insert("size", storage.size_bytes as i64);
            if let Some(max) = storage.max_documents {
                command.insert("max", max as i64);
            }
        }
        command
    }
}
