//! Error types for the provisioner
//!
//! Driver errors are classified by server error code so callers can tell a
//! re-run conflict from a data problem or an unreachable server.

use mongodb::error::{ErrorKind, WriteFailure};

/// Server error codes the provisioner reacts to
pub mod codes {
    pub const DUPLICATE_KEY: i32 = 11000;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
    pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
    pub const USER_ALREADY_EXISTS: i32 = 51003;
}

/// Main error type for provisioning operations
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Declared state differs from the live state in a way that cannot be
    /// reconciled in place
    #[error("Drift: {0}")]
    Drift(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProvisionError {
    /// Process exit code for the deployment pipeline
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::ConnectionFailure(_) => 3,
            Self::AlreadyExists(_) => 4,
            Self::ConstraintViolation(_) => 5,
            Self::Drift(_) => 6,
            Self::Database(_) => 1,
        }
    }

    /// Extract the server error code from a driver error, if there is one
    pub fn server_code(err: &mongodb::error::Error) -> Option<i32> {
        match err.kind.as_ref() {
            ErrorKind::Command(command) => Some(command.code),
            ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
            _ => None,
        }
    }

    fn is_connection_error(err: &mongodb::error::Error) -> bool {
        matches!(
            err.kind.as_ref(),
            ErrorKind::ServerSelection { .. }
                | ErrorKind::Io(_)
                | ErrorKind::ConnectionPoolCleared { .. }
                | ErrorKind::DnsResolve { .. }
        )
    }
}

impl From<mongodb::error::Error> for ProvisionError {
    fn from(err: mongodb::error::Error) -> Self {
        if Self::is_connection_error(&err) {
            return Self::ConnectionFailure(err.to_string());
        }

        match Self::server_code(&err) {
            Some(codes::NAMESPACE_EXISTS) | Some(codes::USER_ALREADY_EXISTS) => {
                Self::AlreadyExists(err.to_string())
            }
            Some(codes::DUPLICATE_KEY) | Some(codes::DOCUMENT_VALIDATION_FAILURE) => {
                Self::ConstraintViolation(err.to_string())
            }
            Some(codes::INDEX_OPTIONS_CONFLICT) | Some(codes::INDEX_KEY_SPECS_CONFLICT) => {
                Self::Drift(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<bson::de::Error> for ProvisionError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("Unexpected server response: {}", err))
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
