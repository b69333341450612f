use std::marker::PhantomData;
use std::pin::Pin;

use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt};

use crate::{
    EntityKey, PartitionId, Result, RowStream, TableBackend, TableEntity, TableRow,
    TableStoreError, UniqueId,
};

/// A lazy stream of entities.
pub type EntityStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Generic repository over one partitioned table.
///
/// The repository is responsible for:
/// 1. Serializing entities into row payloads and back
/// 2. Copying the backend-assigned etag and timestamp onto entities
/// 3. Enforcing that updates carry a version token
///
/// It never writes across partitions atomically; multi-entity consistency
/// is the caller's job.
pub struct TableRepository<T, B>
where
    T: TableEntity,
    B: TableBackend,
{
    backend: B,
    table: String,
    _phantom: PhantomData<T>,
}

impl<T, B> Clone for TableRepository<T, B>
where
    T: TableEntity,
    B: TableBackend + Clone,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            table: self.table.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T, B> TableRepository<T, B>
where
    T: TableEntity,
    B: TableBackend,
{
    /// Creates a repository bound to `table` on the given backend.
    pub fn new(backend: B, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
            _phantom: PhantomData,
        }
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Point lookup. An absent entity is `Ok(None)`, not an error.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn get(&self, partition: &PartitionId, unique: &UniqueId) -> Result<Option<T>> {
        self.record("get");
        let key = EntityKey::new(partition.clone(), unique.clone());
        self.backend
            .get_row(&self.table, &key)
            .await?
            .map(from_row)
            .transpose()
    }

    /// Lazily streams every entity in one partition.
    pub fn scan_partition(&self, partition: &PartitionId) -> EntityStream<T> {
        self.record("scan_partition");
        entities(self.backend.query_partition(&self.table, partition))
    }

    /// Lazily streams every entity in the table.
    ///
    /// Meant for low-volume administrative listing; latency grows with the
    /// table.
    pub fn scan_all(&self) -> EntityStream<T> {
        self.record("scan_all");
        entities(self.backend.query_all(&self.table))
    }

    /// Finds an entity by unique id alone, scanning the whole table.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn find_by_unique_id(&self, unique: &UniqueId) -> Result<Option<T>> {
        let mut entities = self.scan_all();
        while let Some(entity) = entities.try_next().await? {
            if &entity.key().unique_id == unique {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }

    /// Inserts a new entity, failing with `AlreadyExists` on a key collision.
    ///
    /// Returns the entity carrying its assigned etag and timestamp.
    #[tracing::instrument(skip(self, entity), fields(table = %self.table, key = %entity.key()))]
    pub async fn insert(&self, entity: &T) -> Result<T> {
        self.record("insert");
        let payload = serde_json::to_value(entity)?;
        let row = self
            .backend
            .insert_row(&self.table, entity.key(), payload)
            .await?;
        Ok(stamp(entity.clone(), &row))
    }

    /// Replaces a stored entity if its etag still matches.
    ///
    /// Fails with `MissingVersion` if the entity was never read from the
    /// store, and with `ConcurrencyConflict` if another writer got there
    /// first. The stored entity is left untouched on failure.
    #[tracing::instrument(skip(self, entity), fields(table = %self.table, key = %entity.key()))]
    pub async fn update(&self, entity: &T) -> Result<T> {
        self.record("update");
        let expected = entity
            .metadata()
            .etag
            .clone()
            .ok_or_else(|| TableStoreError::MissingVersion {
                key: entity.key().clone(),
            })?;

        let payload = serde_json::to_value(entity)?;
        let row = self
            .backend
            .replace_row(&self.table, entity.key(), payload, &expected)
            .await
            .inspect_err(|e| {
                if matches!(e, TableStoreError::ConcurrencyConflict { .. }) {
                    metrics::counter!("table_store_conflicts_total", "table" => self.table.clone())
                        .increment(1);
                }
            })?;
        Ok(stamp(entity.clone(), &row))
    }

    /// Deletes an entity. Deleting an absent entity is not an error.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn delete(&self, partition: &PartitionId, unique: &UniqueId) -> Result<()> {
        self.record("delete");
        let key = EntityKey::new(partition.clone(), unique.clone());
        self.backend.delete_row(&self.table, &key).await
    }

    fn record(&self, op: &'static str) {
        metrics::counter!(
            "table_store_operations_total",
            "table" => self.table.clone(),
            "op" => op
        )
        .increment(1);
    }
}

fn entities<T: TableEntity>(rows: RowStream) -> EntityStream<T> {
    Box::pin(rows.map(|row| row.and_then(from_row)))
}

fn from_row<T: TableEntity>(row: TableRow) -> Result<T> {
    let entity: T = serde_json::from_value(row.payload.clone())?;
    Ok(stamp(entity, &row))
}

/// The row's key and metadata overwrite whatever the payload carried.
fn stamp<T: TableEntity>(mut entity: T, row: &TableRow) -> T {
    *entity.key_mut() = row.key.clone();
    *entity.metadata_mut() = row.metadata();
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryTableBackend, RowMetadata};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        #[serde(flatten)]
        key: EntityKey,
        #[serde(flatten)]
        meta: RowMetadata,
        name: String,
        stock: u32,
    }

    impl TableEntity for Widget {
        fn key(&self) -> &EntityKey {
            &self.key
        }
        fn key_mut(&mut self) -> &mut EntityKey {
            &mut self.key
        }
        fn metadata(&self) -> &RowMetadata {
            &self.meta
        }
        fn metadata_mut(&mut self) -> &mut RowMetadata {
            &mut self.meta
        }
    }

    fn widget(partition: &str, name: &str) -> Widget {
        Widget {
            key: EntityKey::generate(PartitionId::new(partition)),
            meta: RowMetadata::unsaved(),
            name: name.to_string(),
            stock: 1,
        }
    }

    fn repo() -> TableRepository<Widget, InMemoryTableBackend> {
        TableRepository::new(InMemoryTableBackend::new().with_page_size(2), "Widgets")
    }

    #[tokio::test]
    async fn get_after_insert_returns_inserted_entity() {
        let repo = repo();
        let w = widget("CATEGORY-TOOLS", "Hammer");

        let inserted = repo.insert(&w).await.unwrap();
        assert!(inserted.meta.etag.is_some());
        assert!(inserted.meta.last_modified.is_some());

        let fetched = repo
            .get(&w.key.partition_id, &w.key.unique_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, inserted);
        assert_eq!(fetched.name, w.name);
        assert_eq!(fetched.key, w.key);
    }

    #[tokio::test]
    async fn update_without_etag_is_rejected() {
        let repo = repo();
        let w = widget("CATEGORY-TOOLS", "Hammer");
        repo.insert(&w).await.unwrap();

        let result = repo.update(&w).await;
        assert!(matches!(result, Err(TableStoreError::MissingVersion { .. })));
    }

    #[tokio::test]
    async fn update_assigns_new_etag() {
        let repo = repo();
        let mut stored = repo.insert(&widget("CATEGORY-TOOLS", "Hammer")).await.unwrap();
        let first_etag = stored.meta.etag.clone();

        stored.stock = 10;
        let updated = repo.update(&stored).await.unwrap();

        assert_ne!(updated.meta.etag, first_etag);
        assert_eq!(updated.stock, 10);
    }

    #[tokio::test]
    async fn stale_update_conflicts_and_leaves_entity_unchanged() {
        let repo = repo();
        let stored = repo.insert(&widget("CATEGORY-TOOLS", "Hammer")).await.unwrap();

        let mut a = stored.clone();
        let mut b = stored.clone();
        a.stock = 5;
        b.stock = 7;

        repo.update(&a).await.unwrap();
        let result = repo.update(&b).await;
        assert!(matches!(
            result,
            Err(TableStoreError::ConcurrencyConflict { .. })
        ));

        let current = repo
            .get(&stored.key.partition_id, &stored.key.unique_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.stock, 5);
    }

    #[tokio::test]
    async fn delete_missing_entity_is_ok() {
        let repo = repo();
        repo.delete(&PartitionId::new("CATEGORY-TOOLS"), &UniqueId::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scans_stream_across_pages() {
        let repo = repo();
        for name in ["a", "b", "c", "d", "e"] {
            repo.insert(&widget("CATEGORY-TOOLS", name)).await.unwrap();
        }
        repo.insert(&widget("CATEGORY-GARDEN", "rake")).await.unwrap();

        let tools: Vec<Widget> = repo
            .scan_partition(&PartitionId::new("CATEGORY-TOOLS"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(tools.len(), 5);
        assert!(tools.iter().all(|w| w.meta.etag.is_some()));

        let all: Vec<Widget> = repo.scan_all().try_collect().await.unwrap();
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn find_by_unique_id_searches_all_partitions() {
        let repo = repo();
        repo.insert(&widget("CATEGORY-TOOLS", "a")).await.unwrap();
        let target = repo.insert(&widget("CATEGORY-GARDEN", "rake")).await.unwrap();

        let found = repo
            .find_by_unique_id(&target.key.unique_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.key, target.key);

        let missing = repo.find_by_unique_id(&UniqueId::new()).await.unwrap();
        assert!(missing.is_none());
    }
}
