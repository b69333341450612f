//! Integration tests for the back office workflows.
//!
//! These tests run customers, products and orders against one shared
//! in-memory backend, the way the HTTP server wires them.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use common::{EntityKey, PartitionId, UniqueId};
use domain::{
    ContactField, ContactIndex, Customer, CustomerChanges, CustomerService, DomainError,
    NewCustomer, NewOrder, NewProduct, OrderLineRequest, OrderService, OrderStatus, Product,
    ProductService, RelocationStrategy, ScanContactIndex,
};
use integrations::{EventPublisher, InMemoryEventPublisher, InMemoryObjectStorage};
use rust_decimal::Decimal;
use table_store::{InMemoryTableBackend, TableRepository};
use tokio::sync::Barrier;

struct Backoffice {
    backend: InMemoryTableBackend,
    publisher: InMemoryEventPublisher,
    customers: CustomerService<InMemoryTableBackend>,
    products: ProductService<InMemoryTableBackend>,
    orders: OrderService<InMemoryTableBackend>,
}

fn backoffice() -> Backoffice {
    let backend = InMemoryTableBackend::new().with_page_size(3);
    let publisher = InMemoryEventPublisher::new();
    let storage = InMemoryObjectStorage::new("product-images");
    Backoffice {
        customers: CustomerService::new(backend.clone(), Arc::new(publisher.clone())),
        products: ProductService::new(
            backend.clone(),
            Arc::new(storage),
            Arc::new(publisher.clone()),
        ),
        orders: OrderService::new(backend.clone(), Arc::new(publisher.clone())),
        backend,
        publisher,
    }
}

fn jane() -> NewCustomer {
    NewCustomer {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        email: "jane@example.com".to_string(),
        phone: None,
        city: "Durban".to_string(),
    }
}

fn product(name: &str, price: &str) -> NewProduct {
    NewProduct {
        category: "Grocery".to_string(),
        name: name.to_string(),
        description: None,
        price: Decimal::from_str(price).unwrap(),
        stock_quantity: 100,
    }
}

async fn seed(b: &Backoffice) -> (Customer, Product, Product) {
    let customer = b.customers.create(jane()).await.unwrap();
    let milk = b.products.create(product("Milk", "24.99"), None).await.unwrap();
    let bread = b.products.create(product("Bread", "15.50"), None).await.unwrap();
    (customer, milk, bread)
}

fn order_for(customer: &Customer, lines: Vec<OrderLineRequest>) -> NewOrder {
    NewOrder {
        customer_id: customer.key.unique_id.to_string(),
        lines,
        status: None,
    }
}

mod order_placement {
    use super::*;

    #[tokio::test]
    async fn jane_doe_scenario() {
        let b = backoffice();
        let (customer, milk, bread) = seed(&b).await;
        assert_eq!(customer.key.partition_id.as_str(), "CITY-DURBAN");

        let order = b
            .orders
            .create_order(order_for(
                &customer,
                vec![
                    OrderLineRequest::new(milk.key.unique_id.as_str(), 2),
                    OrderLineRequest::new(bread.key.unique_id.as_str(), 1),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(order.total, Decimal::from_str("65.48").unwrap());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(
            order.key.partition_id.as_str(),
            format!("CUSTOMER-{}", customer.key.unique_id)
        );

        // Jane moves to Cape Town
        let moved = b
            .customers
            .update(
                &customer.key,
                CustomerChanges {
                    customer: NewCustomer {
                        city: "Cape Town".to_string(),
                        ..jane()
                    },
                    etag: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.key.partition_id.as_str(), "CITY-CAPE TOWN");
        assert_eq!(moved.key.unique_id, customer.key.unique_id);
        assert!(b.customers.list(Some("Durban")).await.unwrap().is_empty());
        assert_eq!(b.customers.list(Some("Cape Town")).await.unwrap().len(), 1);

        // The order is still found by its own key and by customer
        let fetched = b.orders.get(&order.key).await.unwrap().unwrap();
        assert_eq!(fetched.total, order.total);
        let by_customer = b
            .orders
            .list(Some(&moved.key.unique_id))
            .await
            .unwrap();
        assert_eq!(by_customer.len(), 1);
    }

    #[tokio::test]
    async fn events_follow_the_order() {
        let b = backoffice();
        let (customer, milk, bread) = seed(&b).await;
        b.publisher.clear().await;

        let order = b
            .orders
            .create_order(order_for(
                &customer,
                vec![
                    OrderLineRequest::new(milk.key.unique_id.as_str(), 2),
                    OrderLineRequest::new(bread.key.unique_id.as_str(), 1),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(
            b.publisher.published_types().await,
            vec!["order-created", "inventory-reserve", "inventory-reserve"]
        );
        let messages = b.publisher.peek(10).await.unwrap();
        assert_eq!(messages[0].body["orderId"], order.key.unique_id.as_str());
        assert_eq!(messages[1].body["productId"], milk.key.unique_id.as_str());
        assert_eq!(messages[1].body["qty"], 2);
        assert_eq!(messages[2].body["orderId"], order.key.unique_id.as_str());
    }

    #[tokio::test]
    async fn prices_come_from_the_catalogue() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;

        let order = b
            .orders
            .create_order(order_for(
                &customer,
                vec![OrderLineRequest::new(milk.key.unique_id.as_str(), 3)],
            ))
            .await
            .unwrap();
        assert_eq!(order.lines[0].price, milk.price);
        assert_eq!(order.lines[0].name, "Milk");
        assert_eq!(order.total, Decimal::from_str("74.97").unwrap());

        // A later price change does not touch the stored snapshot
        let mut changes = domain::ProductChanges::unchanged(&milk);
        changes.price = Decimal::from_str("30.00").unwrap();
        b.products.update(&milk.key, changes, None).await.unwrap();

        let stored = b.orders.get(&order.key).await.unwrap().unwrap();
        assert_eq!(stored.lines[0].price, Decimal::from_str("24.99").unwrap());
    }

    #[tokio::test]
    async fn zero_valid_lines_is_empty_order() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;

        let result = b
            .orders
            .create_order(order_for(
                &customer,
                vec![
                    OrderLineRequest::new(milk.key.unique_id.as_str(), 0),
                    OrderLineRequest::new("", 2),
                ],
            ))
            .await;

        assert!(matches!(result, Err(DomainError::EmptyOrder)));
        assert!(b.orders.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_product_leaves_no_order() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;
        b.publisher.clear().await;

        let result = b
            .orders
            .create_order(order_for(
                &customer,
                vec![
                    OrderLineRequest::new(milk.key.unique_id.as_str(), 1),
                    OrderLineRequest::new("no-such-product", 1),
                ],
            ))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::ProductNotFound(id)) if id.as_str() == "no-such-product"
        ));
        assert_eq!(b.backend.row_count("Orders").await, 0);
        assert!(b.publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_customer_is_rejected() {
        let b = backoffice();
        let (_, milk, _) = seed(&b).await;

        let result = b
            .orders
            .create_order(NewOrder {
                customer_id: UniqueId::new().to_string(),
                lines: vec![OrderLineRequest::new(milk.key.unique_id.as_str(), 1)],
                status: None,
            })
            .await;

        assert!(matches!(result, Err(DomainError::CustomerNotFound(_))));
        assert_eq!(b.backend.row_count("Orders").await, 0);
    }

    #[tokio::test]
    async fn status_override_and_fallback() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;
        let line = || vec![OrderLineRequest::new(milk.key.unique_id.as_str(), 1)];

        let mut request = order_for(&customer, line());
        request.status = Some("processing".to_string());
        let order = b.orders.create_order(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        let mut request = order_for(&customer, line());
        request.status = Some("Teleported".to_string());
        let order = b.orders.create_order(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn publish_failure_keeps_the_order() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;
        b.publisher.set_fail_on_publish(true);

        let order = b
            .orders
            .create_order(order_for(
                &customer,
                vec![OrderLineRequest::new(milk.key.unique_id.as_str(), 1)],
            ))
            .await
            .unwrap();

        assert!(b.orders.get(&order.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn status_update_and_delete() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;
        let order = b
            .orders
            .create_order(order_for(
                &customer,
                vec![OrderLineRequest::new(milk.key.unique_id.as_str(), 1)],
            ))
            .await
            .unwrap();

        let updated = b
            .orders
            .update_status(&order.key, OrderStatus::Completed, order.meta.etag.clone())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Completed);
        assert_eq!(updated.total, order.total);

        // The etag from before the update is now stale
        let stale = b
            .orders
            .update_status(&order.key, OrderStatus::Cancelled, order.meta.etag.clone())
            .await;
        assert!(matches!(
            stale,
            Err(DomainError::ConcurrencyConflict { .. })
        ));

        assert!(b.orders.delete(&order.key).await.unwrap());
        assert!(!b.orders.delete(&order.key).await.unwrap());
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn two_product_updates_one_wins() {
        let b = backoffice();
        let (_, milk, _) = seed(&b).await;
        let repo: &TableRepository<Product, InMemoryTableBackend> = b.products.repository();

        let mut first = milk.clone();
        first.stock_quantity = 90;
        let mut second = milk.clone();
        second.stock_quantity = 80;

        let (a, c) = tokio::join!(repo.update(&first), repo.update(&second));
        assert_eq!(
            [a.is_ok(), c.is_ok()].iter().filter(|ok| **ok).count(),
            1,
            "exactly one writer must win"
        );

        let stored = b.products.get(&milk.key).await.unwrap().unwrap();
        assert!(stored.stock_quantity == 90 || stored.stock_quantity == 80);
    }

    /// Lets both uniqueness checks finish before either insert runs.
    struct LockstepIndex {
        inner: ScanContactIndex<InMemoryTableBackend>,
        barrier: Barrier,
    }

    #[async_trait]
    impl ContactIndex for LockstepIndex {
        async fn find_conflict(
            &self,
            email: &str,
            phone: Option<&str>,
            exclude: Option<&UniqueId>,
        ) -> domain::Result<Option<ContactField>> {
            let result = self.inner.find_conflict(email, phone, exclude).await;
            self.barrier.wait().await;
            result
        }
    }

    #[tokio::test]
    async fn contact_uniqueness_is_not_atomic_with_insert() {
        let backend = InMemoryTableBackend::new();
        let index = LockstepIndex {
            inner: ScanContactIndex::new(TableRepository::new(
                backend.clone(),
                domain::CUSTOMERS_TABLE,
            )),
            barrier: Barrier::new(2),
        };
        let customers = CustomerService::new(backend.clone(), Arc::new(InMemoryEventPublisher::new()))
            .with_contact_index(Arc::new(index));

        let (a, c) = tokio::join!(customers.create(jane()), customers.create(jane()));

        // Both checks saw an empty table, so both inserts went through
        assert!(a.is_ok());
        assert!(c.is_ok());
        let all = customers.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.email == "jane@example.com"));
    }
}

mod relocation {
    use super::*;

    #[tokio::test]
    async fn same_city_any_case_is_normal_update() {
        let b = backoffice();
        let customer = b.customers.create(jane()).await.unwrap();

        let updated = b
            .customers
            .update(
                &customer.key,
                CustomerChanges {
                    customer: NewCustomer {
                        city: "DURBAN".to_string(),
                        last_name: "Smith".to_string(),
                        ..jane()
                    },
                    etag: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.key, customer.key);
        assert_eq!(updated.last_name, "Smith");
    }

    #[tokio::test]
    async fn failed_insert_is_reported_as_inconsistency() {
        let b = backoffice();
        let customer = b.customers.create(jane()).await.unwrap();
        b.backend.set_fail_on_insert(true);

        let result = b
            .customers
            .update(
                &customer.key,
                CustomerChanges {
                    customer: NewCustomer {
                        city: "Cape Town".to_string(),
                        ..jane()
                    },
                    etag: None,
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(DomainError::RelocationInconsistency { .. })
        ));
    }

    #[tokio::test]
    async fn insert_first_keeps_entity_when_insert_fails() {
        let backend = InMemoryTableBackend::new();
        let customers = CustomerService::new(backend.clone(), Arc::new(InMemoryEventPublisher::new()))
            .with_relocation_strategy(RelocationStrategy::InsertThenDelete);
        let customer = customers.create(jane()).await.unwrap();
        backend.set_fail_on_insert(true);

        let result = customers
            .update(
                &customer.key,
                CustomerChanges {
                    customer: NewCustomer {
                        city: "Cape Town".to_string(),
                        ..jane()
                    },
                    etag: None,
                },
            )
            .await;

        assert!(matches!(result, Err(DomainError::Store(_))));
        let still_there = customers.get(&customer.key).await.unwrap();
        assert!(still_there.is_some());
    }

    #[tokio::test]
    async fn product_category_change_keeps_orders_resolvable() {
        let b = backoffice();
        let (customer, milk, _) = seed(&b).await;

        let mut changes = domain::ProductChanges::unchanged(&milk);
        changes.category = Some("Dairy".to_string());
        let moved = b.products.update(&milk.key, changes, None).await.unwrap();
        assert_eq!(
            moved.key,
            EntityKey::new(PartitionId::new("CATEGORY-DAIRY"), milk.key.unique_id.clone())
        );

        // Orders find products by unique id, whatever their partition
        let order = b
            .orders
            .create_order(order_for(
                &customer,
                vec![OrderLineRequest::new(milk.key.unique_id.as_str(), 1)],
            ))
            .await
            .unwrap();
        assert_eq!(order.total, Decimal::from_str("24.99").unwrap());
    }
}
