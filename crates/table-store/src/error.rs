use thiserror::Error;

use crate::{ETag, EntityKey};

/// Errors that can occur when interacting with a table backend.
#[derive(Debug, Error)]
pub enum TableStoreError {
    /// An insert collided with an existing composite key.
    #[error("Entity already exists in {table}: {key}")]
    AlreadyExists { table: String, key: EntityKey },

    /// The version token presented on update did not match the stored one.
    #[error("Concurrency conflict in {table} for {key}: expected etag {expected}, found {actual}")]
    ConcurrencyConflict {
        table: String,
        key: EntityKey,
        expected: ETag,
        actual: ETag,
    },

    /// An update targeted a row that does not exist.
    #[error("Entity not found in {table}: {key}")]
    NotFound { table: String, key: EntityKey },

    /// An update was attempted without a version token.
    #[error("Missing version token for update of {key}")]
    MissingVersion { key: EntityKey },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for table store operations.
pub type Result<T> = std::result::Result<T, TableStoreError>;
