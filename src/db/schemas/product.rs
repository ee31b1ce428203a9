//! Product document schema
//!
//! Catalog entries keyed by a unique SKU.

use bson::{doc, oid::ObjectId, Decimal128, Document};
use serde::{Deserialize, Serialize};

use crate::db::schemas::{CollectionSchema, IndexSpec};

/// Collection name for products
pub const PRODUCT_COLLECTION: &str = "products";

/// Price currency
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Gbp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
        }
    }
}

/// Product lifecycle status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductStatus {
    Active,
    Inactive,
    #[default]
    Draft,
}

impl ProductStatus {
    pub const ALL: [ProductStatus; 3] = [
        ProductStatus::Active,
        ProductStatus::Inactive,
        ProductStatus::Draft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Draft => "DRAFT",
        }
    }
}

/// Product document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProductDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Stock-keeping unit, unique across the catalog
    pub sku: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub price: Decimal128,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,

    /// Owning category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<ObjectId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,

    /// Image URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Free-form attributes (size, colour, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Document>,
}

impl ProductDoc {
    /// Create a new draft product
    pub fn new(sku: String, name: String, price: Decimal128) -> Self {
        Self {
            id: None,
            sku,
            name,
            description: None,
            price,
            currency: None,
            category_id: None,
            status: Some(ProductStatus::Draft),
            images: Vec::new(),
            attributes: None,
        }
    }
}

impl CollectionSchema for ProductDoc {
    const COLLECTION: &'static str = PRODUCT_COLLECTION;

    fn validator() -> Option<Document> {
        let currencies: Vec<&str> = Currency::ALL.iter().map(Currency::as_str).collect();
        let statuses: Vec<&str> = ProductStatus::ALL.iter().map(ProductStatus::as_str).collect();

        Some(doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": ["sku", "name", "price"],
                "properties": {
                    "sku": {
                        "bsonType": "string",
                        "description": "Unique product SKU",
                    },
                    "name": {
                        "bsonType": "string",
                        "description": "Product name",
                    },
                    "description": { "bsonType": "string" },
                    "price": {
                        "bsonType": "decimal",
                        "description": "Product price",
                    },
                    "currency": { "bsonType": "string", "enum": currencies },
                    "categoryId": { "bsonType": "objectId" },
                    "status": { "bsonType": "string", "enum": statuses },
                    "images": {
                        "bsonType": "array",
                        "items": { "bsonType": "string" },
                    },
                    "attributes": { "bsonType": "object" },
                }
            }
        })
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::ascending("sku").unique(),
            IndexSpec::ascending("name"),
            IndexSpec::ascending("categoryId"),
            IndexSpec::ascending("status"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enums_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&Currency::Gbp).unwrap(), "\"GBP\"");
        assert_eq!(
            serde_json::to_string(&ProductStatus::Inactive).unwrap(),
            "\"INACTIVE\""
        );
        for status in ProductStatus::ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }

    #[test]
    fn test_validator_requires_core_fields() {
        let validator = ProductDoc::validator().unwrap();
        let schema = validator.get_document("$jsonSchema").unwrap();
        let required: Vec<&str> = schema
            .get_array("required")
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert_eq!(required, vec!["sku", "name", "price"]);

        let currency = schema
            .get_document("properties")
            .and_then(|p| p.get_document("currency"))
            .unwrap();
        assert_eq!(currency.get_array("enum").unwrap().len(), 3);
    }

    #[test]
    fn test_sku_index_is_unique_and_first() {
        let indexes = ProductDoc::indexes();
        assert_eq!(indexes[0].name(), "sku_1");
        assert!(indexes[0].unique);
        assert!(indexes[1..].iter().all(|i| !i.unique));
    }

    #[test]
    fn test_document_uses_camel_case_fields() {
        let mut product = ProductDoc::new(
            "SKU-1".to_string(),
            "Kettle".to_string(),
            "19.99".parse().unwrap(),
        );
        product.category_id = Some(ObjectId::new());

        let doc = bson::to_document(&product).unwrap();
        assert!(doc.contains_key("categoryId"));
        assert!(!doc.contains_key("_id"));
        assert!(!doc.contains_key("images"));
        assert_eq!(doc.get_str("status").unwrap(), "DRAFT");
    }
}
