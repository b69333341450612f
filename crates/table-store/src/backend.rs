use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::{StreamExt, future, stream};

use crate::{ETag, EntityKey, PartitionId, Result, TableRow};

/// Number of rows fetched per backend round trip when scanning.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A lazy stream of rows.
///
/// Backends page internally; the caller sees one logical, finite stream that
/// cannot be restarted once it has advanced. Rows inserted or removed while a
/// scan is in flight may or may not appear.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<TableRow>> + Send>>;

/// Storage backend for partitioned tables.
///
/// A backend stores rows addressed by `(table, partition_id, unique_id)`.
/// Its native atomic scope is a single row; nothing here spans partitions.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Point lookup. Returns `None` if the row is absent.
    async fn get_row(&self, table: &str, key: &EntityKey) -> Result<Option<TableRow>>;

    /// Streams every row of one partition, ordered by unique id.
    fn query_partition(&self, table: &str, partition: &PartitionId) -> RowStream;

    /// Streams every row of the table, ordered by key.
    fn query_all(&self, table: &str) -> RowStream;

    /// Inserts a new row.
    ///
    /// Fails with `AlreadyExists` if the key is taken. Returns the stored row
    /// with its assigned version token and timestamp.
    async fn insert_row(
        &self,
        table: &str,
        key: &EntityKey,
        payload: serde_json::Value,
    ) -> Result<TableRow>;

    /// Replaces an existing row if its version token still matches.
    ///
    /// Fails with `ConcurrencyConflict` on a token mismatch and `NotFound`
    /// if the row is absent. Returns the row with a new version token.
    async fn replace_row(
        &self,
        table: &str,
        key: &EntityKey,
        payload: serde_json::Value,
        expected: &ETag,
    ) -> Result<TableRow>;

    /// Deletes a row. Deleting an absent row is not an error.
    async fn delete_row(&self, table: &str, key: &EntityKey) -> Result<()>;
}

/// Builds a lazy row stream from a page fetcher using keyset pagination.
///
/// `fetch_page` receives the key of the last row already yielded (`None` for
/// the first page) and the page size, and returns up to `page_size` rows
/// ordered by key. A short page ends the stream; an error is yielded once
/// and ends the stream.
pub(crate) fn paged_stream<F, Fut>(page_size: usize, fetch_page: F) -> RowStream
where
    F: FnMut(Option<EntityKey>, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<TableRow>>> + Send + 'static,
{
    struct Cursor<F> {
        fetch_page: F,
        after: Option<EntityKey>,
        done: bool,
    }

    let page_size = page_size.max(1);
    let cursor = Cursor {
        fetch_page,
        after: None,
        done: false,
    };

    let pages = stream::unfold(cursor, move |mut cursor| async move {
        if cursor.done {
            return None;
        }
        match (cursor.fetch_page)(cursor.after.clone(), page_size).await {
            Ok(rows) => {
                cursor.done = rows.len() < page_size;
                cursor.after = rows.last().map(|row| row.key.clone());
                Some((Ok(rows), cursor))
            }
            Err(e) => {
                cursor.done = true;
                Some((Err(e), cursor))
            }
        }
    });

    Box::pin(pages.flat_map(|page| match page {
        Ok(rows) => stream::iter(rows.into_iter().map(Ok)).left_stream(),
        Err(e) => stream::once(future::ready(Err(e))).right_stream(),
    }))
}
