//! Order service: placing, listing and editing orders.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::{EntityKey, UniqueId, customer_partition};
use futures_util::TryStreamExt;
use integrations::{DomainEvent, EventPublisher, publish_best_effort};
use table_store::{ETag, TableBackend, TableRepository};

use crate::customer::Customer;
use crate::error::{DomainError, Result};
use crate::product::Product;
use crate::{CUSTOMERS_TABLE, ORDERS_TABLE, PRODUCTS_TABLE};

use super::{NewOrder, Order, OrderLine, OrderLineRequest, OrderStatus};

/// Service for managing orders.
///
/// Order creation reads the customer and every referenced product before
/// writing anything, so a failed lookup never leaves a partial order.
pub struct OrderService<B: TableBackend> {
    customers: TableRepository<Customer, B>,
    products: TableRepository<Product, B>,
    orders: TableRepository<Order, B>,
    publisher: Arc<dyn EventPublisher>,
}

impl<B: TableBackend + Clone> OrderService<B> {
    /// Creates a new order service over the given backend.
    pub fn new(backend: B, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            customers: TableRepository::new(backend.clone(), CUSTOMERS_TABLE),
            products: TableRepository::new(backend.clone(), PRODUCTS_TABLE),
            orders: TableRepository::new(backend, ORDERS_TABLE),
            publisher,
        }
    }
}

impl<B: TableBackend> OrderService<B> {
    /// Returns the underlying orders repository.
    pub fn repository(&self) -> &TableRepository<Order, B> {
        &self.orders
    }

    /// Places an order.
    ///
    /// Lines are priced from the stored products; caller input never
    /// carries prices. Events are published after the order is stored and
    /// a publish failure does not undo it.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        let wanted = valid_lines(&request.lines)?;
        if wanted.is_empty() {
            return Err(DomainError::EmptyOrder);
        }

        let customer_id = UniqueId::from(request.customer_id.trim());
        let customer = self
            .customers
            .find_by_unique_id(&customer_id)
            .await?
            .ok_or_else(|| DomainError::CustomerNotFound(customer_id.clone()))?;

        let catalogue = self.resolve_products(&wanted).await?;

        let mut lines = Vec::with_capacity(wanted.len());
        for (product_id, qty) in wanted {
            let product = catalogue
                .get(&product_id)
                .ok_or_else(|| DomainError::ProductNotFound(product_id.clone()))?;
            lines.push(OrderLine {
                sku: product_id,
                name: product.name.clone(),
                qty,
                price: product.price,
            });
        }

        let status = OrderStatus::parse_or_default(request.status.as_deref());
        let order = self
            .orders
            .insert(&Order::new(customer.key.unique_id.clone(), lines, status))
            .await?;

        tracing::info!(
            key = %order.key,
            total = %order.total,
            lines = order.lines.len(),
            "Order created"
        );
        metrics::counter!("orders_created_total").increment(1);

        publish_best_effort(
            self.publisher.as_ref(),
            &DomainEvent::order_created(
                order.key.unique_id.clone(),
                order.customer_id.clone(),
                order.total,
            ),
        )
        .await;
        for line in &order.lines {
            publish_best_effort(
                self.publisher.as_ref(),
                &DomainEvent::inventory_reserve(
                    line.sku.clone(),
                    line.qty,
                    order.key.unique_id.clone(),
                ),
            )
            .await;
        }

        Ok(order)
    }

    /// Loads an order by key. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &EntityKey) -> Result<Option<Order>> {
        Ok(self.orders.get(&key.partition_id, &key.unique_id).await?)
    }

    /// Lists orders, newest first, optionally only one customer's.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, customer_id: Option<&UniqueId>) -> Result<Vec<Order>> {
        let stream = match customer_id {
            Some(id) => self.orders.scan_partition(&customer_partition(id)),
            None => self.orders.scan_all(),
        };
        let mut orders: Vec<Order> = stream.try_collect().await?;
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(orders)
    }

    /// Sets an order's status. Lines and total are never edited.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        key: &EntityKey,
        status: OrderStatus,
        etag: Option<ETag>,
    ) -> Result<Order> {
        let mut order = self.get(key).await?.ok_or_else(|| DomainError::NotFound {
            table: ORDERS_TABLE.to_string(),
            key: key.clone(),
        })?;
        if let Some(etag) = etag {
            order.meta.etag = Some(etag);
        }

        let previous = order.status;
        order.status = status;
        let order = self.orders.update(&order).await?;

        tracing::info!(key = %order.key, from = %previous, to = %status, "Order status changed");
        Ok(order)
    }

    /// Deletes an order. Returns whether it existed.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, key: &EntityKey) -> Result<bool> {
        let existed = self.get(key).await?.is_some();
        self.orders.delete(&key.partition_id, &key.unique_id).await?;
        Ok(existed)
    }

    /// Finds every requested product in one pass over the products table.
    async fn resolve_products(
        &self,
        lines: &[(UniqueId, u32)],
    ) -> Result<HashMap<UniqueId, Product>> {
        let mut missing: HashSet<&UniqueId> = lines.iter().map(|(id, _)| id).collect();
        let mut found = HashMap::with_capacity(missing.len());

        let mut products = self.products.scan_all();
        while let Some(product) = products.try_next().await? {
            if missing.remove(&product.key.unique_id) {
                found.insert(product.key.unique_id.clone(), product);
            }
            if missing.is_empty() {
                break;
            }
        }
        Ok(found)
    }
}

/// Drops lines without a product or with a quantity below 1.
fn valid_lines(requested: &[OrderLineRequest]) -> Result<Vec<(UniqueId, u32)>> {
    requested
        .iter()
        .filter_map(|line| {
            let product_id = line.product_id.as_deref().map(str::trim)?;
            (!product_id.is_empty() && line.quantity > 0).then_some((product_id, line.quantity))
        })
        .map(|(product_id, quantity)| {
            let qty = u32::try_from(quantity)
                .map_err(|_| DomainError::validation("quantity", "is too large"))?;
            Ok((UniqueId::from(product_id), qty))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lines_are_dropped() {
        let lines = vec![
            OrderLineRequest::new("milk", 2),
            OrderLineRequest::new("bread", 0),
            OrderLineRequest::new("eggs", -3),
            OrderLineRequest::new("  ", 1),
            OrderLineRequest {
                product_id: None,
                quantity: 4,
            },
            OrderLineRequest::new(" jam ", 1),
        ];
        let valid = valid_lines(&lines).unwrap();
        assert_eq!(
            valid,
            vec![(UniqueId::from("milk"), 2), (UniqueId::from("jam"), 1)]
        );
    }

    #[test]
    fn oversized_quantity_is_rejected() {
        let lines = vec![OrderLineRequest::new("milk", i64::from(u32::MAX) + 1)];
        assert!(matches!(
            valid_lines(&lines),
            Err(DomainError::ValidationFailed {
                field: "quantity",
                ..
            })
        ));
    }
}
