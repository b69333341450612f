//! Durable queue for domain events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;

use crate::error::{IntegrationError, Result};
use crate::events::DomainEvent;

/// A message as it sits on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Position in the queue, increasing with enqueue order.
    pub id: i64,
    /// The event's `type` discriminator.
    pub event_type: String,
    /// The serialized event.
    pub body: serde_json::Value,
    /// When the message was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// Trait for handing events to a queue.
///
/// Delivery is at-least-once; consumers must tolerate duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Enqueues one event.
    async fn publish(&self, event: &DomainEvent) -> Result<()>;

    /// Returns up to `max` of the oldest queued messages without removing them.
    async fn peek(&self, max: usize) -> Result<Vec<QueuedMessage>>;
}

/// Publishes an event, swallowing any failure.
///
/// Events are raised after the state change is already persisted, so a
/// failed publish must never fail the caller's operation. Failures are
/// logged and counted instead.
pub async fn publish_best_effort(publisher: &dyn EventPublisher, event: &DomainEvent) {
    match publisher.publish(event).await {
        Ok(()) => {
            metrics::counter!("events_published_total", "type" => event.event_name())
                .increment(1);
        }
        Err(e) => {
            tracing::warn!(event_type = event.event_name(), error = %e, "Failed to publish event");
            metrics::counter!("events_publish_failed_total", "type" => event.event_name())
                .increment(1);
        }
    }
}

/// In-memory publisher for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    messages: Arc<RwLock<Vec<QueuedMessage>>>,
    fail_on_publish: Arc<AtomicBool>,
}

impl InMemoryEventPublisher {
    /// Creates an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent publish to fail.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns every event published so far, oldest first.
    pub async fn published(&self) -> Vec<DomainEvent> {
        self.messages
            .read()
            .await
            .iter()
            .filter_map(|m| serde_json::from_value(m.body.clone()).ok())
            .collect()
    }

    /// Returns the `type` of every event published so far, oldest first.
    pub async fn published_types(&self) -> Vec<String> {
        self.messages
            .read()
            .await
            .iter()
            .map(|m| m.event_type.clone())
            .collect()
    }

    /// Drops all queued messages.
    pub async fn clear(&self) {
        self.messages.write().await.clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(IntegrationError::Publish {
                event: event.event_name().to_string(),
                reason: "queue unavailable".to_string(),
            });
        }

        let body = serde_json::to_value(event)?;
        let mut messages = self.messages.write().await;
        let id = messages.len() as i64 + 1;
        messages.push(QueuedMessage {
            id,
            event_type: event.event_name().to_string(),
            body,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    async fn peek(&self, max: usize) -> Result<Vec<QueuedMessage>> {
        Ok(self.messages.read().await.iter().take(max).cloned().collect())
    }
}

/// Publisher backed by the `queue_messages` table.
#[derive(Clone)]
pub struct PostgresQueuePublisher {
    pool: PgPool,
    queue_name: String,
}

impl PostgresQueuePublisher {
    /// Creates a publisher writing to `queue_name`.
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn row_to_message(row: PgRow) -> Result<QueuedMessage> {
        Ok(QueuedMessage {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            body: row.try_get("body")?,
            enqueued_at: row.try_get("enqueued_at")?,
        })
    }
}

#[async_trait]
impl EventPublisher for PostgresQueuePublisher {
    #[tracing::instrument(skip(self, event), fields(queue = %self.queue_name, event_type = event.event_name()))]
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let body = serde_json::to_value(event)?;

        sqlx::query(
            r#"
            INSERT INTO queue_messages (queue_name, event_type, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&self.queue_name)
        .bind(event.event_name())
        .bind(&body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn peek(&self, max: usize) -> Result<Vec<QueuedMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, body, enqueued_at
            FROM queue_messages
            WHERE queue_name = $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(&self.queue_name)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{PartitionId, UniqueId};

    fn event() -> DomainEvent {
        DomainEvent::customer_created(
            UniqueId::from("c1"),
            PartitionId::new("CITY-DURBAN"),
            "Jane Doe",
        )
    }

    #[tokio::test]
    async fn publish_and_peek() {
        let publisher = InMemoryEventPublisher::new();
        publisher.publish(&event()).await.unwrap();
        publisher
            .publish(&DomainEvent::customer_deleted(
                UniqueId::from("c1"),
                PartitionId::new("CITY-DURBAN"),
            ))
            .await
            .unwrap();

        let peeked = publisher.peek(1).await.unwrap();
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].id, 1);
        assert_eq!(peeked[0].event_type, "customer-created");
        assert_eq!(peeked[0].body["name"], "Jane Doe");

        assert_eq!(
            publisher.published_types().await,
            vec!["customer-created", "customer-deleted"]
        );
        assert_eq!(publisher.published().await[0], event());
    }

    #[tokio::test]
    async fn failed_publish_is_an_error() {
        let publisher = InMemoryEventPublisher::new();
        publisher.set_fail_on_publish(true);

        let result = publisher.publish(&event()).await;
        assert!(matches!(result, Err(IntegrationError::Publish { .. })));
        assert!(publisher.peek(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let publisher = InMemoryEventPublisher::new();
        publisher.set_fail_on_publish(true);
        publish_best_effort(&publisher, &event()).await;
        assert!(publisher.published().await.is_empty());

        publisher.set_fail_on_publish(false);
        publish_best_effort(&publisher, &event()).await;
        assert_eq!(publisher.published().await.len(), 1);
    }
}
