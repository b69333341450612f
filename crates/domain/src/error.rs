//! Domain error types.

use common::{EntityKey, UniqueId};
use integrations::IntegrationError;
use table_store::{ETag, TableStoreError};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed validation before any write was attempted.
    #[error("{field}: {message}")]
    ValidationFailed {
        field: &'static str,
        message: String,
    },

    /// No order line survived filtering.
    #[error("Order has no valid lines")]
    EmptyOrder,

    /// The customer an order refers to does not exist.
    #[error("Customer not found: {0}")]
    CustomerNotFound(UniqueId),

    /// A product an order line refers to does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(UniqueId),

    /// The addressed entity does not exist.
    #[error("{table} entity not found: {key}")]
    NotFound { table: String, key: EntityKey },

    /// No file with this name is on the file share.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// An entity with the same key is already stored.
    #[error("{table} entity already exists: {key}")]
    AlreadyExists { table: String, key: EntityKey },

    /// The entity changed since it was read.
    #[error("Concurrency conflict on {key}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        key: EntityKey,
        expected: ETag,
        actual: ETag,
    },

    /// A relocation stopped half way and left storage inconsistent.
    #[error("Relocation of {from} to {to} left storage inconsistent: {reason}")]
    RelocationInconsistency {
        from: EntityKey,
        to: EntityKey,
        reason: String,
    },

    /// An infrastructure error in the table store.
    #[error("Table store error: {0}")]
    Store(TableStoreError),

    /// The object store, file share or queue failed.
    #[error("Storage error: {0}")]
    Storage(#[from] IntegrationError),
}

impl DomainError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::ValidationFailed {
            field,
            message: message.into(),
        }
    }
}

impl From<TableStoreError> for DomainError {
    fn from(e: TableStoreError) -> Self {
        match e {
            TableStoreError::NotFound { table, key } => DomainError::NotFound { table, key },
            TableStoreError::AlreadyExists { table, key } => {
                DomainError::AlreadyExists { table, key }
            }
            TableStoreError::ConcurrencyConflict {
                key,
                expected,
                actual,
                ..
            } => DomainError::ConcurrencyConflict {
                key,
                expected,
                actual,
            },
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Fails with `ValidationFailed` when `value` is blank.
pub(crate) fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "is required"));
    }
    Ok(())
}
