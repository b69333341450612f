use thiserror::Error;

/// Errors raised by the queue and object storage collaborators.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// A message could not be handed to the queue.
    #[error("Failed to publish {event}: {reason}")]
    Publish { event: String, reason: String },

    /// The object store rejected a store or remove call.
    #[error("Object storage error: {0}")]
    Storage(String),

    /// The file share rejected an upload, download or delete.
    #[error("File share error: {0}")]
    FileShare(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for integration operations.
pub type Result<T> = std::result::Result<T, IntegrationError>;
