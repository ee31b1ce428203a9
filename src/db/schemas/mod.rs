//! Database schemas for the storefront
//!
//! Defines MongoDB document structures and the collection and user declarations the
//! provisioner applies.

mod category;
mod event;
mod product;
mod review;
mod spec;
mod user;

pub use category::{CategoryDoc, CATEGORY_COLLECTION};
pub use event::{EventDoc, EVENT_COLLECTION, EVENT_MAX_DOCUMENTS, EVENT_STORAGE_BYTES};
pub use product::{Currency, ProductDoc, ProductStatus, PRODUCT_COLLECTION};
pub use review::{ReviewDoc, MAX_RATING, MIN_RATING, REVIEW_COLLECTION};
pub use spec::{CappedStorage, CollectionSchema, CollectionSpec, IndexDirection, IndexSpec};
pub use user::{RoleGrant, UserSpec};

/// Collections in the order they are provisioned
pub fn declared_collections() -> Vec<CollectionSpec> {
    vec![
        CollectionSpec::of::<ProductDoc>(),
        CollectionSpec::of::<CategoryDoc>(),
        CollectionSpec::of::<ReviewDoc>(),
        CollectionSpec::of::<EventDoc>(),
    ]
}
