pub mod backend;
pub mod entity;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod row;

pub use backend::{DEFAULT_PAGE_SIZE, RowStream, TableBackend};
pub use common::{EntityKey, PartitionId, UniqueId};
pub use entity::TableEntity;
pub use error::{Result, TableStoreError};
pub use memory::InMemoryTableBackend;
pub use postgres::PostgresTableBackend;
pub use repository::{EntityStream, TableRepository};
pub use row::{ETag, RowMetadata, TableRow};
