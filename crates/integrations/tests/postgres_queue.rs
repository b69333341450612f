//! PostgreSQL queue integration tests
//!
//! Run with:
//!
//! ```bash
//! cargo test -p integrations --test postgres_queue
//! ```

use std::sync::Arc;

use common::{PartitionId, UniqueId};
use integrations::{DomainEvent, EventPublisher, PostgresQueuePublisher};
use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_queue_messages.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE queue_messages RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

#[tokio::test]
#[serial]
async fn publish_then_peek_in_order() {
    let publisher = PostgresQueuePublisher::new(get_test_pool().await, "orders");

    let order_id = UniqueId::new();
    publisher
        .publish(&DomainEvent::order_created(
            order_id.clone(),
            UniqueId::from("c1"),
            Decimal::new(6548, 2),
        ))
        .await
        .unwrap();
    publisher
        .publish(&DomainEvent::inventory_reserve(
            UniqueId::from("p1"),
            2,
            order_id.clone(),
        ))
        .await
        .unwrap();

    let messages = publisher.peek(10).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].event_type, "order-created");
    assert_eq!(messages[0].body["orderId"], order_id.as_str());
    assert_eq!(messages[1].event_type, "inventory-reserve");
    assert_eq!(messages[1].body["qty"], 2);

    // Peeking does not consume
    assert_eq!(publisher.peek(1).await.unwrap().len(), 1);
    assert_eq!(publisher.peek(10).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn queues_are_isolated_by_name() {
    let pool = get_test_pool().await;
    let orders = PostgresQueuePublisher::new(pool.clone(), "orders");
    let audit = PostgresQueuePublisher::new(pool, "audit");

    orders
        .publish(&DomainEvent::customer_deleted(
            UniqueId::from("c1"),
            PartitionId::new("CITY-DURBAN"),
        ))
        .await
        .unwrap();

    assert_eq!(orders.peek(10).await.unwrap().len(), 1);
    assert!(audit.peek(10).await.unwrap().is_empty());
}
