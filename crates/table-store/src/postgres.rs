use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::backend::{DEFAULT_PAGE_SIZE, RowStream, TableBackend, paged_stream};
use crate::{ETag, EntityKey, PartitionId, Result, TableRow, TableStoreError};

/// PostgreSQL-backed table backend.
///
/// All logical tables share one physical table, `table_rows`, whose primary
/// key is `(table_name, partition_id, unique_id)`.
#[derive(Clone)]
pub struct PostgresTableBackend {
    pool: PgPool,
    page_size: usize,
}

impl PostgresTableBackend {
    /// Creates a new PostgreSQL table backend.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the number of rows fetched per scan page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_table_row(row: PgRow) -> Result<TableRow> {
        Ok(TableRow {
            key: EntityKey::new(
                row.try_get::<String, _>("partition_id")?,
                row.try_get::<String, _>("unique_id")?,
            ),
            etag: ETag::new(row.try_get::<String, _>("etag")?),
            last_modified: row.try_get("last_modified")?,
            payload: row.try_get("payload")?,
        })
    }

    async fn current_etag(&self, table: &str, key: &EntityKey) -> Result<Option<ETag>> {
        let etag: Option<String> = sqlx::query_scalar(
            "SELECT etag FROM table_rows WHERE table_name = $1 AND partition_id = $2 AND unique_id = $3",
        )
        .bind(table)
        .bind(key.partition_id.as_str())
        .bind(key.unique_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(etag.map(ETag::new))
    }
}

#[async_trait]
impl TableBackend for PostgresTableBackend {
    async fn get_row(&self, table: &str, key: &EntityKey) -> Result<Option<TableRow>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT partition_id, unique_id, etag, last_modified, payload
            FROM table_rows
            WHERE table_name = $1 AND partition_id = $2 AND unique_id = $3
            "#,
        )
        .bind(table)
        .bind(key.partition_id.as_str())
        .bind(key.unique_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_table_row).transpose()
    }

    fn query_partition(&self, table: &str, partition: &PartitionId) -> RowStream {
        let pool = self.pool.clone();
        let table = table.to_string();
        let partition = partition.as_str().to_string();

        paged_stream(self.page_size, move |after, page_size| {
            let pool = pool.clone();
            let table = table.clone();
            let partition = partition.clone();
            async move {
                let after = after.map(|key| key.unique_id.as_str().to_string());
                let rows = sqlx::query(
                    r#"
                    SELECT partition_id, unique_id, etag, last_modified, payload
                    FROM table_rows
                    WHERE table_name = $1
                      AND partition_id = $2
                      AND ($3::TEXT IS NULL OR unique_id > $3)
                    ORDER BY unique_id ASC
                    LIMIT $4
                    "#,
                )
                .bind(&table)
                .bind(&partition)
                .bind(after)
                .bind(page_size as i64)
                .fetch_all(&pool)
                .await?;

                rows.into_iter()
                    .map(Self::row_to_table_row)
                    .collect::<Result<Vec<_>>>()
            }
        })
    }

    fn query_all(&self, table: &str) -> RowStream {
        let pool = self.pool.clone();
        let table = table.to_string();

        paged_stream(self.page_size, move |after, page_size| {
            let pool = pool.clone();
            let table = table.clone();
            async move {
                let (after_partition, after_unique) = match after {
                    Some(key) => (
                        Some(key.partition_id.as_str().to_string()),
                        Some(key.unique_id.as_str().to_string()),
                    ),
                    None => (None, None),
                };
                let rows = sqlx::query(
                    r#"
                    SELECT partition_id, unique_id, etag, last_modified, payload
                    FROM table_rows
                    WHERE table_name = $1
                      AND ($2::TEXT IS NULL OR (partition_id, unique_id) > ($2, $3::TEXT))
                    ORDER BY partition_id ASC, unique_id ASC
                    LIMIT $4
                    "#,
                )
                .bind(&table)
                .bind(after_partition)
                .bind(after_unique)
                .bind(page_size as i64)
                .fetch_all(&pool)
                .await?;

                rows.into_iter()
                    .map(Self::row_to_table_row)
                    .collect::<Result<Vec<_>>>()
            }
        })
    }

    async fn insert_row(
        &self,
        table: &str,
        key: &EntityKey,
        payload: serde_json::Value,
    ) -> Result<TableRow> {
        let row = TableRow::stamped(key.clone(), payload);

        sqlx::query(
            r#"
            INSERT INTO table_rows (table_name, partition_id, unique_id, etag, last_modified, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(table)
        .bind(key.partition_id.as_str())
        .bind(key.unique_id.as_str())
        .bind(row.etag.as_str())
        .bind(row.last_modified)
        .bind(&row.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // A primary key violation means the composite key is taken
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_table_row_key")
            {
                return TableStoreError::AlreadyExists {
                    table: table.to_string(),
                    key: key.clone(),
                };
            }
            TableStoreError::Database(e)
        })?;

        Ok(row)
    }

    async fn replace_row(
        &self,
        table: &str,
        key: &EntityKey,
        payload: serde_json::Value,
        expected: &ETag,
    ) -> Result<TableRow> {
        let row = TableRow::stamped(key.clone(), payload);

        let result = sqlx::query(
            r#"
            UPDATE table_rows
            SET etag = $5, last_modified = $6, payload = $7
            WHERE table_name = $1 AND partition_id = $2 AND unique_id = $3 AND etag = $4
            "#,
        )
        .bind(table)
        .bind(key.partition_id.as_str())
        .bind(key.unique_id.as_str())
        .bind(expected.as_str())
        .bind(row.etag.as_str())
        .bind(row.last_modified)
        .bind(&row.payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(row);
        }

        // Nothing matched: either the row is gone or its etag moved on
        match self.current_etag(table, key).await? {
            Some(actual) => Err(TableStoreError::ConcurrencyConflict {
                table: table.to_string(),
                key: key.clone(),
                expected: expected.clone(),
                actual,
            }),
            None => Err(TableStoreError::NotFound {
                table: table.to_string(),
                key: key.clone(),
            }),
        }
    }

    async fn delete_row(&self, table: &str, key: &EntityKey) -> Result<()> {
        sqlx::query(
            "DELETE FROM table_rows WHERE table_name = $1 AND partition_id = $2 AND unique_id = $3",
        )
        .bind(table)
        .bind(key.partition_id.as_str())
        .bind(key.unique_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
