//! Messages put on the back office queue.
//!
//! The JSON shape of every variant is a wire contract with downstream
//! consumers: a `type` discriminator in kebab-case, camelCase fields, money
//! as JSON numbers and `utc` as an RFC 3339 timestamp.

use chrono::{DateTime, Utc};
use common::{PartitionId, UniqueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A state change announced to the rest of the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    /// An order was persisted.
    OrderCreated {
        order_id: UniqueId,
        customer_id: UniqueId,
        #[serde(with = "rust_decimal::serde::float")]
        total: Decimal,
        utc: DateTime<Utc>,
    },

    /// Stock should be held for one order line.
    InventoryReserve {
        product_id: UniqueId,
        qty: u32,
        order_id: UniqueId,
        utc: DateTime<Utc>,
    },

    /// A customer was registered.
    CustomerCreated {
        customer_id: UniqueId,
        city_partition: PartitionId,
        name: String,
        utc: DateTime<Utc>,
    },

    /// A customer was removed.
    CustomerDeleted {
        customer_id: UniqueId,
        partition_key: PartitionId,
        utc: DateTime<Utc>,
    },

    /// A product was added to the catalogue.
    ProductCreated {
        product_id: UniqueId,
        category: PartitionId,
        name: String,
        #[serde(with = "rust_decimal::serde::float")]
        price: Decimal,
        has_image: bool,
        utc: DateTime<Utc>,
    },

    /// A product was removed from the catalogue.
    ProductDeleted {
        product_id: UniqueId,
        partition_key: PartitionId,
        utc: DateTime<Utc>,
    },

    /// An image was attached to a new product.
    ProductImageUploaded {
        product_id: UniqueId,
        url: String,
        utc: DateTime<Utc>,
    },

    /// A product's image was swapped for a new one.
    ProductImageReplaced {
        product_id: UniqueId,
        new_url: String,
        utc: DateTime<Utc>,
    },

    /// A contract document was put on the file share.
    ContractUploaded { file_name: String, utc: DateTime<Utc> },

    /// A contract document was removed from the file share.
    ContractDeleted { file_name: String, utc: DateTime<Utc> },
}

impl DomainEvent {
    /// The `type` discriminator as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "order-created",
            DomainEvent::InventoryReserve { .. } => "inventory-reserve",
            DomainEvent::CustomerCreated { .. } => "customer-created",
            DomainEvent::CustomerDeleted { .. } => "customer-deleted",
            DomainEvent::ProductCreated { .. } => "product-created",
            DomainEvent::ProductDeleted { .. } => "product-deleted",
            DomainEvent::ProductImageUploaded { .. } => "product-image-uploaded",
            DomainEvent::ProductImageReplaced { .. } => "product-image-replaced",
            DomainEvent::ContractUploaded { .. } => "contract-uploaded",
            DomainEvent::ContractDeleted { .. } => "contract-deleted",
        }
    }

    /// When the event was raised.
    pub fn utc(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::OrderCreated { utc, .. }
            | DomainEvent::InventoryReserve { utc, .. }
            | DomainEvent::CustomerCreated { utc, .. }
            | DomainEvent::CustomerDeleted { utc, .. }
            | DomainEvent::ProductCreated { utc, .. }
            | DomainEvent::ProductDeleted { utc, .. }
            | DomainEvent::ProductImageUploaded { utc, .. }
            | DomainEvent::ProductImageReplaced { utc, .. }
            | DomainEvent::ContractUploaded { utc, .. }
            | DomainEvent::ContractDeleted { utc, .. } => *utc,
        }
    }

    pub fn order_created(order_id: UniqueId, customer_id: UniqueId, total: Decimal) -> Self {
        DomainEvent::OrderCreated {
            order_id,
            customer_id,
            total,
            utc: Utc::now(),
        }
    }

    pub fn inventory_reserve(product_id: UniqueId, qty: u32, order_id: UniqueId) -> Self {
        DomainEvent::InventoryReserve {
            product_id,
            qty,
            order_id,
            utc: Utc::now(),
        }
    }

    pub fn customer_created(
        customer_id: UniqueId,
        city_partition: PartitionId,
        name: impl Into<String>,
    ) -> Self {
        DomainEvent::CustomerCreated {
            customer_id,
            city_partition,
            name: name.into(),
            utc: Utc::now(),
        }
    }

    pub fn customer_deleted(customer_id: UniqueId, partition_key: PartitionId) -> Self {
        DomainEvent::CustomerDeleted {
            customer_id,
            partition_key,
            utc: Utc::now(),
        }
    }

    pub fn product_created(
        product_id: UniqueId,
        category: PartitionId,
        name: impl Into<String>,
        price: Decimal,
        has_image: bool,
    ) -> Self {
        DomainEvent::ProductCreated {
            product_id,
            category,
            name: name.into(),
            price,
            has_image,
            utc: Utc::now(),
        }
    }

    pub fn product_deleted(product_id: UniqueId, partition_key: PartitionId) -> Self {
        DomainEvent::ProductDeleted {
            product_id,
            partition_key,
            utc: Utc::now(),
        }
    }

    pub fn product_image_uploaded(product_id: UniqueId, url: impl Into<String>) -> Self {
        DomainEvent::ProductImageUploaded {
            product_id,
            url: url.into(),
            utc: Utc::now(),
        }
    }

    pub fn product_image_replaced(product_id: UniqueId, new_url: impl Into<String>) -> Self {
        DomainEvent::ProductImageReplaced {
            product_id,
            new_url: new_url.into(),
            utc: Utc::now(),
        }
    }

    pub fn contract_uploaded(file_name: impl Into<String>) -> Self {
        DomainEvent::ContractUploaded {
            file_name: file_name.into(),
            utc: Utc::now(),
        }
    }

    pub fn contract_deleted(file_name: impl Into<String>) -> Self {
        DomainEvent::ContractDeleted {
            file_name: file_name.into(),
            utc: Utc::now(),
        }
    }
}
