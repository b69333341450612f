//! HTTP route handlers.

pub mod contracts;
pub mod customers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use common::EntityKey;

/// Builds an entity key from the `{pk}/{rk}` path segments.
pub(crate) fn entity_key((pk, rk): (String, String)) -> EntityKey {
    EntityKey::new(pk, rk)
}
