//! Database provisioner
//!
//! Runs the fixed declaration sequence against a [`SchemaStore`]:
//!
//! 1. ensure the application user
//! 2. ensure each collection (validator, capped storage)
//! 3. ensure each collection's secondary indexes
//!
//! Every step reads the live state first and applies only the difference, so
//! re-running against a provisioned database changes nothing. The first
//! failing step aborts the run; earlier steps are not rolled back.

pub mod plan;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ExistingPolicy;
use crate::db::schemas::{CollectionSpec, IndexSpec, UserSpec};
use crate::db::store::SchemaStore;
use crate::types::{ProvisionError, Result};

pub use plan::Action;

/// Provisioner settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionConfig {
    pub on_existing: ExistingPolicy,
    /// Plan only; no mutating call reaches the store
    pub dry_run: bool,
}

/// Kind of object a step targets
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    User,
    Collection,
    Index,
}

/// Outcome of one `ensure_*` call
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    /// `user@authDb`, `collection`, or `collection.index_name`
    pub target: String,
    pub action: Action,
}

/// Steps performed by a run, in order
#[derive(Serialize, Clone, Debug, Default)]
pub struct ProvisionReport {
    pub database: String,
    pub dry_run: bool,
    pub steps: Vec<Step>,
}

impl ProvisionReport {
    /// Number of steps that changed (or would change) the database
    pub fn changes(&self) -> usize {
        self.steps.iter().filter(|s| s.action.is_change()).count()
    }

    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

/// A run that stopped part-way; `report` holds the steps that completed
#[derive(Debug, thiserror::Error)]
#[error("provisioning failed at step {step} ({target}): {source}")]
pub struct ProvisionFailure {
    /// 1-based position of the failing step
    pub step: usize,
    pub target: String,
    #[source]
    pub source: ProvisionError,
    pub report: ProvisionReport,
}

pub struct Provisioner<S: SchemaStore> {
    store: S,
    config: ProvisionConfig,
    database: String,
}

impl<S: SchemaStore> Provisioner<S> {
    pub fn new(store: S, database: impl Into<String>, config: ProvisionConfig) -> Self {
        Self {
            store,
            config,
            database: database.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply the user and every collection with its indexes
    pub async fn run(
        &self,
        user: &UserSpec,
        collections: &[CollectionSpec],
    ) -> std::result::Result<ProvisionReport, ProvisionFailure> {
        let mut report = ProvisionReport {
            database: self.database.clone(),
            dry_run: self.config.dry_run,
            steps: Vec::new(),
        };

        let outcome = self.ensure_user(user).await;
        self.record(&mut report, user_target(user), outcome)?;

        for collection in collections {
            let outcome = self.ensure_collection(collection).await;
            self.record(&mut report, collection.name.clone(), outcome)?;
        }

        for collection in collections {
            for index in &collection.indexes {
                let outcome = self.ensure_index(&collection.name, index).await;
                self.record(&mut report, index_target(&collection.name, index), outcome)?;
            }
        }

        info!(
            database = %self.database,
            steps = report.steps.len(),
            changes = report.changes(),
            dry_run = self.config.dry_run,
            "Provisioning finished"
        );

        Ok(report)
    }

    fn record(
        &self,
        report: &mut ProvisionReport,
        target: String,
        outcome: Result<Step>,
    ) -> std::result::Result<(), ProvisionFailure> {
        match outcome {
            Ok(step) => {
                report.steps.push(step);
                Ok(())
            }
            Err(source) => {
                let step = report.steps.len() + 1;
                error!(step, object = %target, "Provisioning step failed: {}", source);
                Err(ProvisionFailure {
                    step,
                    target,
                    source,
                    report: report.clone(),
                })
            }
        }
    }

    /// Create the user if missing, or align its roles with the declaration
    pub async fn ensure_user(&self, user: &UserSpec) -> Result<Step> {
        let current = self.store.find_user(&user.auth_db, &user.name).await?;
        let action = plan::plan_user(current.as_ref(), user, self.config.on_existing)?;
        let target = user_target(user);

        self.log_action(StepKind::User, &target, action);
        if !self.config.dry_run {
            match action {
                Action::Create => self.store.create_user(user).await?,
                Action::Update => {
                    warn!(user = %target, roles = %user.roles_display(), "Replacing user roles");
                    self.store.update_user_roles(user).await?
                }
                Action::Unchanged => {}
            }
        }

        Ok(Step {
            kind: StepKind::User,
            target,
            action,
        })
    }

    /// Create the collection if missing, or replace a stale validator
    pub async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<Step> {
        let current = self.store.find_collection(&spec.name).await?;
        let action = plan::plan_collection(current.as_ref(), spec, self.config.on_existing)?;

        self.log_action(StepKind::Collection, &spec.name, action);
        if !self.config.dry_run {
            match (action, &spec.validator) {
                (Action::Create, _) => self.store.create_collection(spec).await?,
                (Action::Update, Some(validator)) => {
                    self.store.set_validator(&spec.name, validator).await?
                }
                (Action::Update, None) | (Action::Unchanged, _) => {}
            }
        }

        Ok(Step {
            kind: StepKind::Collection,
            target: spec.name.clone(),
            action,
        })
    }

    /// Create the index unless one with the same keys and uniqueness exists
    pub async fn ensure_index(&self, collection: &str, index: &IndexSpec) -> Result<Step> {
        let current = self.store.list_indexes(collection).await?;
        let action = plan::plan_index(&current, collection, index)?;
        let target = index_target(collection, index);

        self.log_action(StepKind::Index, &target, action);
        if !self.config.dry_run && action == Action::Create {
            self.store.create_index(collection, index).await?;
        }

        Ok(Step {
            kind: StepKind::Index,
            target,
            action,
        })
    }

    fn log_action(&self, kind: StepKind, target: &str, action: Action) {
        let verb = if self.config.dry_run { "would" } else { "will" };
        match action {
            Action::Unchanged => info!(?kind, object = target, "Up to date"),
            _ => info!(?kind, object = target, "{} {}", verb, action),
        }
    }
}

fn user_target(user: &UserSpec) -> String {
    format!("{}@{}", user.name, user.auth_db)
}

fn index_target(collection: &str, index: &IndexSpec) -> String {
    format!("{}.{}", collection, index.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{declared_collections, RoleGrant};
    use crate::db::store::{CollectionState, InMemorySchemaStore, IndexState, UserState};
    use bson::doc;
    use std::collections::BTreeSet;

    fn user() -> UserSpec {
        UserSpec::application(
            "shopsphere".to_string(),
            "admin".to_string(),
            "mongodb".to_string(),
            "shopsphere",
        )
    }

    fn provisioner(config: ProvisionConfig) -> Provisioner<InMemorySchemaStore> {
        Provisioner::new(InMemorySchemaStore::new(), "shopsphere", config)
    }

    #[tokio::test]
    async fn test_fresh_database_creates_everything() {
        let p = provisioner(ProvisionConfig::default());
        let report = p.run(&user(), &declared_collections()).await.unwrap();

        // 1 user + 4 collections + 10 indexes
        assert_eq!(report.steps.len(), 15);
        assert!(report.steps.iter().all(|s| s.action == Action::Create));
        assert_eq!(report.steps[0].target, "shopsphere@admin");
        assert_eq!(report.steps[1].target, "products");
        assert_eq!(report.steps[5].target, "products.sku_1");
        assert_eq!(report.steps[14].target, "events.entityType_1_entityId_1");

        let indexes = p.store().list_indexes("products").await.unwrap();
        let sku = indexes.iter().find(|i| i.name == "sku_1").unwrap();
        assert!(sku.unique);
        assert_eq!(sku.keys, doc! { "sku": 1 });
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let p = provisioner(ProvisionConfig::default());
        p.run(&user(), &declared_collections()).await.unwrap();
        let mutations = p.store().mutations().await.len();

        let report = p.run(&user(), &declared_collections()).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(p.store().mutations().await.len(), mutations);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_mutate() {
        let p = provisioner(ProvisionConfig {
            dry_run: true,
            ..Default::default()
        });
        let report = p.run(&user(), &declared_collections()).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.changes(), 15);
        assert!(p.store().mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_policy_rejects_existing_user() {
        let p = provisioner(ProvisionConfig {
            on_existing: ExistingPolicy::Fail,
            ..Default::default()
        });
        p.store()
            .seed_user(
                "admin",
                UserState {
                    name: "shopsphere".to_string(),
                    roles: user().roles,
                },
            )
            .await;

        let failure = p.run(&user(), &declared_collections()).await.unwrap_err();
        assert_eq!(failure.step, 1);
        assert_eq!(failure.target, "shopsphere@admin");
        assert!(matches!(failure.source, ProvisionError::AlreadyExists(_)));
        assert!(failure.report.steps.is_empty());
        assert!(p.store().mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_policy_stops_at_existing_collection() {
        let p = provisioner(ProvisionConfig {
            on_existing: ExistingPolicy::Fail,
            ..Default::default()
        });
        let products = declared_collections().remove(0);
        p.store()
            .seed_collection(CollectionState {
                name: products.name.clone(),
                validator: products.validator.clone(),
                storage: None,
            })
            .await;

        let failure = p.run(&user(), &declared_collections()).await.unwrap_err();

        assert_eq!(failure.step, 2);
        assert_eq!(failure.target, "products");
        assert!(matches!(failure.source, ProvisionError::AlreadyExists(_)));
        assert_eq!(failure.report.steps.len(), 1);
        assert_eq!(failure.report.steps[0].kind, StepKind::User);
        assert_eq!(p.store().mutations().await, vec!["create_user:shopsphere"]);
    }

    #[tokio::test]
    async fn test_fail_policy_rerun_stops_at_user() {
        let fresh = provisioner(ProvisionConfig::default());
        fresh.run(&user(), &declared_collections()).await.unwrap();

        let strict = Provisioner::new(
            fresh.store,
            "shopsphere",
            ProvisionConfig {
                on_existing: ExistingPolicy::Fail,
                dry_run: false,
            },
        );
        let failure = strict.run(&user(), &declared_collections()).await.unwrap_err();

        assert_eq!(failure.step, 1);
        assert!(matches!(failure.source, ProvisionError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_existing_index_is_checked_not_rebuilt() {
        let p = provisioner(ProvisionConfig::default());
        p.store()
            .seed_index(
                "products",
                IndexState {
                    name: "sku_1".to_string(),
                    keys: doc! { "sku": 1 },
                    unique: true,
                },
            )
            .await;
        p.store()
            .seed_index(
                "reviews",
                IndexState {
                    name: "productId_1".to_string(),
                    keys: doc! { "productId": 1 },
                    unique: true,
                },
            )
            .await;

        let sku = p
            .ensure_index("products", &IndexSpec::ascending("sku").unique())
            .await
            .unwrap();
        assert_eq!(sku.action, Action::Unchanged);

        let err = p
            .ensure_index("reviews", &IndexSpec::ascending("productId"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Drift(_)));
        assert!(p.store().mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_user_roles_are_reconciled() {
        let p = provisioner(ProvisionConfig::default());
        p.store()
            .seed_user(
                "admin",
                UserState {
                    name: "shopsphere".to_string(),
                    roles: BTreeSet::from([RoleGrant::new("read", "shopsphere")]),
                },
            )
            .await;

        let step = p.ensure_user(&user()).await.unwrap();
        assert_eq!(step.action, Action::Update);

        let state = p.store().find_user("admin", "shopsphere").await.unwrap().unwrap();
        assert_eq!(state.roles, user().roles);
    }

    #[tokio::test]
    async fn test_stale_validator_is_replaced() {
        let p = provisioner(ProvisionConfig::default());
        let products = declared_collections().remove(0);
        p.store()
            .seed_collection(CollectionState {
                name: "products".to_string(),
                validator: Some(doc! { "$jsonSchema": { "required": ["sku"] } }),
                storage: None,
            })
            .await;

        let step = p.ensure_collection(&products).await.unwrap();
        assert_eq!(step.action, Action::Update);

        let state = p.store().find_collection("products").await.unwrap().unwrap();
        assert_eq!(state.validator, products.validator);
        assert_eq!(p.store().mutations().await, vec!["set_validator:products"]);
    }

    #[tokio::test]
    async fn test_duplicate_skus_abort_run() {
        let p = provisioner(ProvisionConfig::default());
        p.store().seed_duplicates("products", "sku").await;

        let failure = p.run(&user(), &declared_collections()).await.unwrap_err();

        // user + 4 collections succeeded, the unique sku index is step 6
        assert_eq!(failure.step, 6);
        assert_eq!(failure.target, "products.sku_1");
        assert!(matches!(failure.source, ProvisionError::ConstraintViolation(_)));
        assert_eq!(failure.report.steps.len(), 5);

        // later indexes were not attempted
        let review_indexes = p.store().list_indexes("reviews").await.unwrap();
        assert!(review_indexes.is_empty());
    }

    #[tokio::test]
    async fn test_index_rerun_is_safe_under_fail_policy() {
        let p = provisioner(ProvisionConfig {
            on_existing: ExistingPolicy::Fail,
            ..Default::default()
        });
        let index = IndexSpec::descending("timestamp");

        assert_eq!(
            p.ensure_index("events", &index).await.unwrap().action,
            Action::Create
        );
        assert_eq!(
            p.ensure_index("events", &index).await.unwrap().action,
            Action::Unchanged
        );
    }

    #[test]
    fn test_report_serializes() {
        let report = ProvisionReport {
            database: "shopsphere".to_string(),
            dry_run: false,
            steps: vec![Step {
                kind: StepKind::Index,
                target: "products.sku_1".to_string(),
                action: Action::Create,
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["kind"], "index");
        assert_eq!(json["steps"][0]["action"], "create");
        assert_eq!(report.changes(), 1);
    }
}
