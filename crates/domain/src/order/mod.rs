//! Orders, partitioned by owning customer.

mod service;
mod status;

pub use service::OrderService;
pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{EntityKey, UniqueId, customer_partition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use table_store::{RowMetadata, TableEntity};

/// Snapshot of one priced line, frozen when the order is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product unique id.
    pub sku: UniqueId,
    /// Product name at the time of ordering.
    pub name: String,
    pub qty: u32,
    /// Unit price at the time of ordering.
    pub price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.qty)
    }
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(flatten)]
    pub key: EntityKey,
    #[serde(flatten)]
    pub meta: RowMetadata,
    pub customer_id: UniqueId,
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
}

impl Order {
    /// Builds an unsaved order for `customer_id`, totalling its lines.
    pub fn new(customer_id: UniqueId, lines: Vec<OrderLine>, status: OrderStatus) -> Self {
        let total = lines.iter().map(OrderLine::line_total).sum();
        Self {
            key: EntityKey::generate(customer_partition(&customer_id)),
            meta: RowMetadata::unsaved(),
            customer_id,
            lines,
            total,
            status,
            order_date: Utc::now(),
        }
    }
}

impl TableEntity for Order {
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

/// One requested line: a product reference and a quantity.
///
/// Lines without a product or with a quantity below 1 are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: i64,
}

impl OrderLineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: Some(product_id.into()),
            quantity,
        }
    }
}

/// Input to order creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub status: Option<String>,
}
