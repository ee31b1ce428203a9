//! Audit event document schema
//!
//! Events land in a capped collection; the storage engine evicts the oldest
//! entries once either limit is reached.

use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::db::schemas::{CappedStorage, CollectionSchema, IndexDirection, IndexSpec};

/// Collection name for audit events
pub const EVENT_COLLECTION: &str = "events";

/// 64 MiB
pub const EVENT_STORAGE_BYTES: u64 = 64 * 1024 * 1024;

pub const EVENT_MAX_DOCUMENTS: u64 = 100_000;

/// Audit event stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub timestamp: DateTime,

    /// Kind of entity the event concerns (product, order, ...)
    pub entity_type: String,

    pub entity_id: String,

    /// What happened (PRODUCT_CREATED, ORDER_PLACED, ...)
    pub event_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Document>,
}

impl EventDoc {
    pub fn new(entity_type: String, entity_id: String, event_type: String) -> Self {
        Self {
            id: None,
            timestamp: DateTime::now(),
            entity_type,
            entity_id,
            event_type,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Document) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl CollectionSchema for EventDoc {
    const COLLECTION: &'static str = EVENT_COLLECTION;

    fn storage() -> Option<CappedStorage> {
        Some(CappedStorage {
            size_bytes: EVENT_STORAGE_BYTES,
            max_documents: Some(EVENT_MAX_DOCUMENTS),
        })
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::descending("timestamp"),
            IndexSpec::compound(&[
                ("entityType", IndexDirection::Ascending),
                ("entityId", IndexDirection::Ascending),
            ]),
        ]
    }
}
