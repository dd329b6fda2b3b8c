use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

use crate::mapper::Identity;

/// Server code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// A single schema violation, reported against a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every violation found while checking one document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_errors(.0))]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Path of the first failing field, if any.
    pub fn first_field(&self) -> Option<&str> {
        self.0.first().map(|e| e.field.as_str())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a store round trip did not complete.
#[derive(Debug, Error)]
pub enum ConnectionFailure {
    #[error("operation timed out after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: missing or invalid setting '{key}'")]
    Configuration { key: String },
    #[error("connection error: {cause}")]
    Connection { cause: ConnectionFailure },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("no document with _id {identity} in '{collection}'")]
    NotFound { collection: String, identity: Identity },
    #[error("a document with _id {identity} already exists in '{collection}'")]
    DuplicateIdentity { collection: String, identity: String },
}

impl StoreError {
    pub fn configuration(key: impl Into<String>) -> Self {
        StoreError::Configuration { key: key.into() }
    }

    pub fn timeout(secs: u64) -> Self {
        StoreError::Connection {
            cause: ConnectionFailure::Timeout(secs),
        }
    }

    /// Classify a driver error raised while writing to `collection`.
    pub fn from_write(collection: &str, identity: impl Into<String>, err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return StoreError::DuplicateIdentity {
                collection: collection.to_string(),
                identity: identity.into(),
            };
        }
        StoreError::from(err)
    }

    /// The driver gave up selecting a server, which is how an unreachable
    /// store surfaces when its own timer expires before ours.
    pub fn is_server_selection(&self) -> bool {
        match self {
            StoreError::Connection {
                cause: ConnectionFailure::Driver(err),
            } => matches!(err.kind.as_ref(), ErrorKind::ServerSelection { .. }),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            StoreError::Connection {
                cause: ConnectionFailure::Timeout(_)
            }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connection { .. })
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Connection {
            cause: ConnectionFailure::Driver(err),
        }
    }
}

impl From<ValidationErrors> for StoreError {
    fn from(errors: ValidationErrors) -> Self {
        StoreError::Validation(errors)
    }
}

impl From<ValidationError> for StoreError {
    fn from(error: ValidationError) -> Self {
        StoreError::Validation(error.into())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}
