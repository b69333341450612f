use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of an entity, independent of its partition.
///
/// Generated ids are random 128-bit values rendered as 32 lowercase hex
/// characters. Ids read back from storage are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    /// Creates a new random unique ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing identifier.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UniqueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UniqueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for UniqueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// First component of a composite key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    /// Wraps a raw partition id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the partition id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison, used to decide whether an entity has to
    /// move to another partition.
    pub fn eq_ignore_case(&self, other: &PartitionId) -> bool {
        self.0.to_uppercase() == other.0.to_uppercase()
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PartitionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Composite `(partition_id, unique_id)` key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub partition_id: PartitionId,
    pub unique_id: UniqueId,
}

impl EntityKey {
    /// Creates a key from its two parts.
    pub fn new(partition_id: impl Into<PartitionId>, unique_id: impl Into<UniqueId>) -> Self {
        Self {
            partition_id: partition_id.into(),
            unique_id: unique_id.into(),
        }
    }

    /// Creates a key in the given partition with a freshly generated unique id.
    pub fn generate(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            unique_id: UniqueId::new(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition_id, self.unique_id)
    }
}
