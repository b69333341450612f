use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{DEFAULT_PAGE_SIZE, RowStream, TableBackend, paged_stream};
use crate::{ETag, EntityKey, PartitionId, Result, TableRow, TableStoreError};

type Table = BTreeMap<EntityKey, TableRow>;
type Tables = Arc<RwLock<HashMap<String, Table>>>;

/// In-memory table backend for tests and local runs.
///
/// Provides the same interface and paging behaviour as the PostgreSQL
/// backend. Clones share the same underlying tables.
#[derive(Clone)]
pub struct InMemoryTableBackend {
    tables: Tables,
    page_size: usize,
    fail_on_insert: Arc<AtomicBool>,
    fail_on_delete: Arc<AtomicBool>,
}

impl Default for InMemoryTableBackend {
    fn default() -> Self {
        Self {
            tables: Tables::default(),
            page_size: DEFAULT_PAGE_SIZE,
            fail_on_insert: Arc::new(AtomicBool::new(false)),
            fail_on_delete: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemoryTableBackend {
    /// Creates a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of rows fetched per scan page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the number of rows stored in a table.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, Table::len)
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }

    /// Configures every subsequent insert to fail.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Configures every subsequent delete to fail.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.fail_on_delete.store(fail, Ordering::SeqCst);
    }

    fn injected_failure(op: &str) -> TableStoreError {
        TableStoreError::Database(sqlx::Error::Protocol(format!("injected {op} failure")))
    }

    fn scan(&self, table: &str, partition: Option<PartitionId>) -> RowStream {
        let tables = self.tables.clone();
        let table = table.to_string();

        paged_stream(self.page_size, move |after, page_size| {
            let tables = tables.clone();
            let table = table.clone();
            let partition = partition.clone();
            async move {
                let tables = tables.read().await;
                let Some(rows) = tables.get(&table) else {
                    return Ok(Vec::new());
                };

                let start = match (after, &partition) {
                    (Some(key), _) => Bound::Excluded(key),
                    (None, Some(p)) => Bound::Included(EntityKey::new(p.clone(), "")),
                    (None, None) => Bound::Unbounded,
                };

                let page: Vec<TableRow> = rows
                    .range((start, Bound::Unbounded))
                    .take_while(|(key, _)| {
                        partition
                            .as_ref()
                            .is_none_or(|p| &key.partition_id == p)
                    })
                    .take(page_size)
                    .map(|(_, row)| row.clone())
                    .collect();
                Ok(page)
            }
        })
    }
}

#[async_trait]
impl TableBackend for InMemoryTableBackend {
    async fn get_row(&self, table: &str, key: &EntityKey) -> Result<Option<TableRow>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    fn query_partition(&self, table: &str, partition: &PartitionId) -> RowStream {
        self.scan(table, Some(partition.clone()))
    }

    fn query_all(&self, table: &str) -> RowStream {
        self.scan(table, None)
    }

    async fn insert_row(
        &self,
        table: &str,
        key: &EntityKey,
        payload: serde_json::Value,
    ) -> Result<TableRow> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(Self::injected_failure("insert"));
        }

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();

        if rows.contains_key(key) {
            return Err(TableStoreError::AlreadyExists {
                table: table.to_string(),
                key: key.clone(),
            });
        }

        let row = TableRow::stamped(key.clone(), payload);
        rows.insert(key.clone(), row.clone());
        Ok(row)
    }

    async fn replace_row(
        &self,
        table: &str,
        key: &EntityKey,
        payload: serde_json::Value,
        expected: &ETag,
    ) -> Result<TableRow> {
        let mut tables = self.tables.write().await;
        let current = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(key))
            .ok_or_else(|| TableStoreError::NotFound {
                table: table.to_string(),
                key: key.clone(),
            })?;

        if &current.etag != expected {
            return Err(TableStoreError::ConcurrencyConflict {
                table: table.to_string(),
                key: key.clone(),
                expected: expected.clone(),
                actual: current.etag.clone(),
            });
        }

        *current = TableRow::stamped(key.clone(), payload);
        Ok(current.clone())
    }

    async fn delete_row(&self, table: &str, key: &EntityKey) -> Result<()> {
        if self.fail_on_delete.load(Ordering::SeqCst) {
            return Err(Self::injected_failure("delete"));
        }

        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(key);
        }
        Ok(())
    }
}
