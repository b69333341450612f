//! Shared key types for the retail back office.
//!
//! Every stored entity is addressed by a two-part key: a partition id that
//! groups entities for range scans (and bounds atomic writes), and a unique
//! id that never changes for the entity's lifetime.

pub mod keys;
pub mod types;

pub use keys::{
    CATEGORY_PREFIX, CITY_PREFIX, CUSTOMER_PREFIX, category_partition, city_partition,
    customer_partition, partition_attribute,
};
pub use types::{EntityKey, PartitionId, UniqueId};
