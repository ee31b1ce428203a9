//! Storefront provisioner
//!
//! Brings a MongoDB database to the state the storefront services expect:
//! an application user, schema-validated `products`, `categories` and
//! `reviews` collections, a capped `events` audit log, and their secondary
//! indexes. Every step is check-then-act, so the tool is safe to re-run.

pub mod config;
pub mod db;
pub mod logging;
pub mod provision;
pub mod types;

pub use config::Args;
pub use provision::{ProvisionConfig, ProvisionFailure, ProvisionReport, Provisioner};
pub use types::{ProvisionError, Result};
