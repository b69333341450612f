use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{EntityKey, RowMetadata};

/// An entity that can be stored in a partitioned table.
///
/// Anything exposing a composite key and row metadata can reuse the single
/// [`TableRepository`](crate::TableRepository) implementation. The entity is
/// serialized whole into the row payload; on read, the key and metadata
/// held by the row are authoritative and overwrite the payload's copies.
pub trait TableEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the entity's composite key.
    fn key(&self) -> &EntityKey;

    /// Returns a mutable reference to the composite key.
    ///
    /// Only relocation changes the partition id; the unique id is never
    /// reassigned once the entity has been stored.
    fn key_mut(&mut self) -> &mut EntityKey;

    /// Returns the entity's version metadata.
    fn metadata(&self) -> &RowMetadata;

    /// Returns a mutable reference to the version metadata.
    fn metadata_mut(&mut self) -> &mut RowMetadata;
}
