//! Reconcile planning
//!
//! Pure comparisons between declared and live state. Each function decides
//! what a single `ensure_*` step has to do; nothing here talks to the server.

use bson::{Bson, Document};
use serde::Serialize;
use std::fmt;

use crate::config::ExistingPolicy;
use crate::db::schemas::{CollectionSpec, IndexSpec, UserSpec};
use crate::db::store::{CollectionState, IndexState, UserState};
use crate::types::{ProvisionError, Result};

/// What a step does (or would do, in a dry run)
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Target is missing and gets created
    Create,
    /// Target exists and part of it gets rewritten
    Update,
    /// Target already matches the declaration
    Unchanged,
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

pub fn plan_user(
    current: Option<&UserState>,
    desired: &UserSpec,
    policy: ExistingPolicy,
) -> Result<Action> {
    let Some(current) = current else {
        return Ok(Action::Create);
    };

    if policy == ExistingPolicy::Fail {
        return Err(ProvisionError::AlreadyExists(format!(
            "User \"{}@{}\" already exists",
            desired.name, desired.auth_db
        )));
    }

    if current.roles == desired.roles {
        Ok(Action::Unchanged)
    } else {
        Ok(Action::Update)
    }
}

pub fn plan_collection(
    current: Option<&CollectionState>,
    desired: &CollectionSpec,
    policy: ExistingPolicy,
) -> Result<Action> {
    let Some(current) = current else {
        return Ok(Action::Create);
    };

    if policy == ExistingPolicy::Fail {
        return Err(ProvisionError::AlreadyExists(format!(
            "Collection '{}' already exists",
            desired.name
        )));
    }

    // Capped limits are fixed at creation time
    if current.storage != desired.storage {
        return Err(ProvisionError::Drift(format!(
            "Collection '{}' has storage {:?}, declared {:?}",
            desired.name, current.storage, desired.storage
        )));
    }

    let same_validator = match (&current.validator, &desired.validator) {
        (Some(live), Some(declared)) => same_document(live, declared),
        // an empty validator on the server means none
        (live, None) => live.as_ref().map_or(true, Document::is_empty),
        (None, Some(_)) => false,
    };

    if same_validator {
        Ok(Action::Unchanged)
    } else if desired.validator.is_none() {
        // Removing a validator is never done implicitly
        Err(ProvisionError::Drift(format!(
            "Collection '{}' has a validator that is not declared",
            desired.name
        )))
    } else {
        Ok(Action::Update)
    }
}

pub fn plan_index(
    current: &[IndexState],
    collection: &str,
    desired: &IndexSpec,
) -> Result<Action> {
    let Some(existing) = current.iter().find(|i| desired.matches_keys(&i.keys)) else {
        if let Some(clash) = current.iter().find(|i| i.name == desired.name()) {
            return Err(ProvisionError::Drift(format!(
                "Index '{}' on '{}' exists with keys {}",
                clash.name, collection, clash.keys
            )));
        }
        return Ok(Action::Create);
    };

    if existing.unique != desired.unique {
        return Err(ProvisionError::Drift(format!(
            "Index '{}' on '{}' has unique={}, declared unique={}",
            existing.name, collection, existing.unique, desired.unique
        )));
    }

    Ok(Action::Unchanged)
}

/// Structural equality of two documents, ignoring key order and numeric
/// width (the server may hand back `1` as int32, int64 or double)
pub fn same_document(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| same_value(value, other)))
}

fn same_value(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => return x == y,
        (None, None) => {}
        _ => return false,
    }

    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => same_document(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| same_value(p, q))
        }
        _ => a == b,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{declared_collections, CappedStorage, RoleGrant};
    use bson::doc;
    use std::collections::BTreeSet;

    fn user() -> UserSpec {
        UserSpec::application(
            "shopsphere".to_string(),
            "admin".to_string(),
            "pw".to_string(),
            "shopsphere",
        )
    }

    fn collection(name: &str) -> CollectionSpec {
        declared_collections()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
    }

    fn state_of(spec: &CollectionSpec) -> CollectionState {
        CollectionState {
            name: spec.name.clone(),
            validator: spec.validator.clone(),
            storage: spec.storage,
        }
    }

    #[test]
    fn test_plan_user() {
        let desired = user();
        assert_eq!(
            plan_user(None, &desired, ExistingPolicy::Reconcile).unwrap(),
            Action::Create
        );

        let same = UserState {
            name: "shopsphere".to_string(),
            roles: desired.roles.clone(),
        };
        assert_eq!(
            plan_user(Some(&same), &desired, ExistingPolicy::Reconcile).unwrap(),
            Action::Unchanged
        );

        let narrower = UserState {
            name: "shopsphere".to_string(),
            roles: BTreeSet::from([RoleGrant::new("read", "shopsphere")]),
        };
        assert_eq!(
            plan_user(Some(&narrower), &desired, ExistingPolicy::Reconcile).unwrap(),
            Action::Update
        );

        assert!(matches!(
            plan_user(Some(&same), &desired, ExistingPolicy::Fail),
            Err(ProvisionError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_plan_collection_missing_and_matching() {
        let products = collection("products");
        assert_eq!(
            plan_collection(None, &products, ExistingPolicy::Fail).unwrap(),
            Action::Create
        );
        assert_eq!(
            plan_collection(Some(&state_of(&products)), &products, ExistingPolicy::Reconcile)
                .unwrap(),
            Action::Unchanged
        );
        assert!(matches!(
            plan_collection(Some(&state_of(&products)), &products, ExistingPolicy::Fail),
            Err(ProvisionError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_plan_collection_validator_changes() {
        let reviews = collection("reviews");

        let mut unvalidated = state_of(&reviews);
        unvalidated.validator = None;
        assert_eq!(
            plan_collection(Some(&unvalidated), &reviews, ExistingPolicy::Reconcile).unwrap(),
            Action::Update
        );

        let mut stale = state_of(&reviews);
        stale.validator = Some(doc! { "$jsonSchema": { "required": ["productId"] } });
        assert_eq!(
            plan_collection(Some(&stale), &reviews, ExistingPolicy::Reconcile).unwrap(),
            Action::Update
        );
    }

    #[test]
    fn test_plan_collection_undeclared_validator_is_drift() {
        let events = collection("events");
        let mut state = state_of(&events);
        state.validator = Some(doc! { "$jsonSchema": { "required": ["timestamp"] } });

        assert!(matches!(
            plan_collection(Some(&state), &events, ExistingPolicy::Reconcile),
            Err(ProvisionError::Drift(_))
        ));

        state.validator = Some(Document::new());
        assert_eq!(
            plan_collection(Some(&state), &events, ExistingPolicy::Reconcile).unwrap(),
            Action::Unchanged
        );
    }

    #[test]
    fn test_plan_collection_storage_mismatch_is_drift() {
        let events = collection("events");

        let mut uncapped = state_of(&events);
        uncapped.storage = None;
        assert!(matches!(
            plan_collection(Some(&uncapped), &events, ExistingPolicy::Reconcile),
            Err(ProvisionError::Drift(_))
        ));

        let mut smaller = state_of(&events);
        smaller.storage = Some(CappedStorage {
            size_bytes: 1024,
            max_documents: Some(100_000),
        });
        assert!(matches!(
            plan_collection(Some(&smaller), &events, ExistingPolicy::Reconcile),
            Err(ProvisionError::Drift(_))
        ));
    }

    #[test]
    fn test_plan_index() {
        let sku = IndexSpec::ascending("sku").unique();
        let id_index = IndexState {
            name: "_id_".to_string(),
            keys: doc! { "_id": 1 },
            unique: false,
        };

        assert_eq!(
            plan_index(&[id_index.clone()], "products", &sku).unwrap(),
            Action::Create
        );

        let existing = IndexState {
            name: "sku_1".to_string(),
            keys: doc! { "sku": 1 },
            unique: true,
        };
        assert_eq!(
            plan_index(&[id_index, existing.clone()], "products", &sku).unwrap(),
            Action::Unchanged
        );

        let not_unique = IndexState {
            unique: false,
            ..existing
        };
        assert!(matches!(
            plan_index(&[not_unique], "products", &sku),
            Err(ProvisionError::Drift(_))
        ));
    }

    #[test]
    fn test_plan_index_name_clash() {
        let clash = IndexState {
            name: "sku_1".to_string(),
            keys: doc! { "sku": -1 },
            unique: false,
        };
        assert!(matches!(
            plan_index(&[clash], "products", &IndexSpec::ascending("sku")),
            Err(ProvisionError::Drift(_))
        ));
    }

    #[test]
    fn test_same_document_ignores_order_and_width() {
        let a = doc! { "minimum": 1, "maximum": 5, "bsonType": "int" };
        let b = doc! { "bsonType": "int", "maximum": 5.0, "minimum": 1_i64 };
        assert!(same_document(&a, &b));

        let c = doc! { "bsonType": "int", "maximum": 6, "minimum": 1 };
        assert!(!same_document(&a, &c));

        // array order still matters
        let x = doc! { "required": ["a", "b"] };
        let y = doc! { "required": ["b", "a"] };
        assert!(!same_document(&x, &y));
    }
}
