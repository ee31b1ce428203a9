//! Category document schema
//!
//! Categories form a tree through `parentId`.

use bson::{doc, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

use crate::db::schemas::{CollectionSchema, IndexSpec};

/// Collection name for categories
pub const CATEGORY_COLLECTION: &str = "categories";

/// Category document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent category; `None` for a root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ObjectId>,
}

impl CategoryDoc {
    /// Create a root category
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Create a child of `parent`
    pub fn child_of(name: String, parent: ObjectId) -> Self {
        Self {
            parent_id: Some(parent),
            ..Self::new(name)
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl CollectionSchema for CategoryDoc {
    const COLLECTION: &'static str = CATEGORY_COLLECTION;

    fn validator() -> Option<Document> {
        Some(doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": ["name"],
                "properties": {
                    "name": { "bsonType": "string" },
                    "description": { "bsonType": "string" },
                    "parentId": { "bsonType": "objectId" },
                }
            }
        })
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::ascending("name")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_only_category_serializes_to_name() {
        let doc = bson::to_document(&CategoryDoc::new("Electronics".to_string())).unwrap();
        assert_eq!(doc, doc! { "name": "Electronics" });
    }

    #[test]
    fn test_child_category() {
        let parent = ObjectId::new();
        let child = CategoryDoc::child_of("Laptops".to_string(), parent);

        assert!(!child.is_root());
        let doc = bson::to_document(&child).unwrap();
        assert_eq!(doc.get_object_id("parentId").unwrap(), parent);
    }
}
