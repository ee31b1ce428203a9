//! Review document schema
//!
//! Product ratings left by users.

use bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::db::schemas::{CollectionSchema, IndexSpec};

/// Collection name for reviews
pub const REVIEW_COLLECTION: &str = "reviews";

/// Lowest accepted rating
pub const MIN_RATING: i32 = 1;

/// Highest accepted rating
pub const MAX_RATING: i32 = 5;

/// Review document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub product_id: ObjectId,

    /// Reviewer, owned by the user service
    pub user_id: ObjectId,

    /// Star rating, MIN_RATING..=MAX_RATING
    pub rating: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl ReviewDoc {
    pub fn new(product_id: ObjectId, user_id: ObjectId, rating: i32) -> Self {
        Self {
            id: None,
            product_id,
            user_id,
            rating,
            comment: None,
            created_at: Some(DateTime::now()),
        }
    }

    /// Whether the rating is inside the range the validator accepts
    pub fn has_valid_rating(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}

impl CollectionSchema for ReviewDoc {
    const COLLECTION: &'static str = REVIEW_COLLECTION;

    fn validator() -> Option<Document> {
        Some(doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": ["productId", "userId", "rating"],
                "properties": {
                    "productId": { "bsonType": "objectId" },
                    "userId": { "bsonType": "objectId" },
                    "rating": {
                        "bsonType": "int",
                        "minimum": MIN_RATING,
                        "maximum": MAX_RATING,
                    },
                    "comment": { "bsonType": "string" },
                    "createdAt": { "bsonType": "date" },
                }
            }
        })
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::ascending("productId"),
            IndexSpec::ascending("userId"),
            IndexSpec::descending("createdAt"),
        ]
    }
}
