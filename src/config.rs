//! Configuration for the provisioner
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::db::schemas::UserSpec;
use crate::types::{ProvisionError, Result};

/// Credential used for the application user in development mode
const DEV_PASSWORD: &str = "mongodb";

/// What to do when a user or collection already exists
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExistingPolicy {
    /// Compare with the declaration and apply only the difference
    #[default]
    Reconcile,
    /// Treat any pre-existing user or collection as an error
    Fail,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Storefront provisioner - applies the storefront database declarations
#[derive(Parser, Debug, Clone)]
#[command(name = "storefront-provisioner")]
#[command(about = "Provision the storefront MongoDB database: user, collections, indexes")]
pub struct Args {
    /// MongoDB connection URI with administrative privilege
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// Database to provision
    #[arg(long, env = "MONGODB_DB", default_value = "shopsphere")]
    pub mongodb_db: String,

    /// Database the application user is defined on
    #[arg(long, env = "MONGODB_AUTH_DB", default_value = "admin")]
    pub auth_db: String,

    /// Application user name
    #[arg(long, env = "APP_DB_USER", default_value = "shopsphere")]
    pub app_user: String,

    /// Application user password (required unless --dev-mode)
    #[arg(long, env = "APP_DB_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    /// Enable development mode (built-in application password)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Behaviour when a user or collection already exists
    #[arg(long, env = "ON_EXISTING", value_enum, default_value_t = ExistingPolicy::Reconcile)]
    pub on_existing: ExistingPolicy,

    /// Compare against the live database and log the plan without applying it
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Print the step report as JSON on stdout when done
    #[arg(long, env = "REPORT_JSON", default_value = "false")]
    pub report_json: bool,

    /// Server selection and connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "3000")]
    pub connect_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get effective application password (uses default in dev mode)
    pub fn app_password(&self) -> Result<String> {
        match (&self.app_password, self.dev_mode) {
            (Some(password), _) => Ok(password.clone()),
            (None, true) => Ok(DEV_PASSWORD.to_string()),
            (None, false) => Err(ProvisionError::Config(
                "APP_DB_PASSWORD is required in production mode".to_string(),
            )),
        }
    }

    /// The application user declaration for the configured names
    pub fn user_spec(&self) -> Result<UserSpec> {
        Ok(UserSpec::application(
            self.app_user.clone(),
            self.auth_db.clone(),
            self.app_password()?,
            &self.mongodb_db,
        ))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.app_password()?;

        if self.app_password.as_deref().is_some_and(str::is_empty) {
            return Err(ProvisionError::Config(
                "APP_DB_PASSWORD must not be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("MONGODB_DB", &self.mongodb_db),
            ("MONGODB_AUTH_DB", &self.auth_db),
            ("APP_DB_USER", &self.app_user),
        ] {
            if value.trim().is_empty() {
                return Err(ProvisionError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.mongodb_db.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(ProvisionError::Config(format!(
                "Invalid database name '{}'",
                self.mongodb_db
            )));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ProvisionError::Config(
                "CONNECT_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Replace the password in a connection URI for logging
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());

    match rest[..authority_end].rfind('@') {
        Some(at) => {
            let userinfo = &rest[..at];
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{}://{}:***{}", &uri[..scheme_end], user, &rest[at..])
        }
        None => uri.to_string(),
    }
}
