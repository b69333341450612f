//! Partition key policy.
//!
//! Partition ids are derived from a domain attribute with a fixed prefix:
//! `"<DOMAIN>-" + uppercase(attribute)`. Callers rely on being able to
//! predict the partition to build scans and to detect relocations.

use crate::{PartitionId, UniqueId};

/// Prefix for customer partitions, keyed by city.
pub const CITY_PREFIX: &str = "CITY-";

/// Prefix for product partitions, keyed by category.
pub const CATEGORY_PREFIX: &str = "CATEGORY-";

/// Prefix for order partitions, keyed by owning customer.
pub const CUSTOMER_PREFIX: &str = "CUSTOMER-";

fn derive(prefix: &str, attribute: &str) -> PartitionId {
    PartitionId::new(format!("{prefix}{}", attribute.trim().to_uppercase()))
}

/// `CITY-<CITY>`
pub fn city_partition(city: &str) -> PartitionId {
    derive(CITY_PREFIX, city)
}

/// `CATEGORY-<CATEGORY>`
pub fn category_partition(category: &str) -> PartitionId {
    derive(CATEGORY_PREFIX, category)
}

/// `CUSTOMER-<customer unique id>`.
///
/// The customer id is used verbatim so the partition can be mapped back to
/// the customer's key.
pub fn customer_partition(customer_id: &UniqueId) -> PartitionId {
    PartitionId::new(format!("{CUSTOMER_PREFIX}{customer_id}"))
}

/// Recovers the attribute part of a partition id, if it carries `prefix`.
pub fn partition_attribute<'a>(partition: &'a PartitionId, prefix: &str) -> Option<&'a str> {
    partition.as_str().strip_prefix(prefix)
}
