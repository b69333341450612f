use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EntityKey;

/// Opaque version token used for optimistic concurrency control.
///
/// A new token is assigned by the backend on every write. Callers never
/// interpret it; they only hand it back on update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Generates a fresh, never-before-seen token.
    pub fn generate() -> Self {
        Self(format!("W/\"{}\"", Uuid::new_v4().simple()))
    }

    /// Wraps a token received from a caller or read from storage.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ETag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ETag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-assigned metadata carried by every stored entity.
///
/// Both fields are `None` until the entity has been written once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMetadata {
    #[serde(default)]
    pub etag: Option<ETag>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl RowMetadata {
    /// Metadata for an entity that has not been persisted yet.
    pub fn unsaved() -> Self {
        Self::default()
    }
}

/// A row as stored by a backend: key, version metadata and a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    /// Composite key of the row.
    pub key: EntityKey,

    /// Version token assigned on the last write.
    pub etag: ETag,

    /// When the row was last written.
    pub last_modified: DateTime<Utc>,

    /// The entity's fields as JSON.
    pub payload: serde_json::Value,
}

impl TableRow {
    /// Stamps a payload with a new version token and the current time.
    pub fn stamped(key: EntityKey, payload: serde_json::Value) -> Self {
        Self {
            key,
            etag: ETag::generate(),
            last_modified: Utc::now(),
            payload,
        }
    }

    /// Returns the row's metadata.
    pub fn metadata(&self) -> RowMetadata {
        RowMetadata {
            etag: Some(self.etag.clone()),
            last_modified: Some(self.last_modified),
        }
    }
}
