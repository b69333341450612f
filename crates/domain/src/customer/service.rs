use std::sync::Arc;

use common::{EntityKey, city_partition};
use futures_util::TryStreamExt;
use integrations::{DomainEvent, EventPublisher, publish_best_effort};
use table_store::{TableBackend, TableRepository};

use crate::CUSTOMERS_TABLE;
use crate::error::{DomainError, Result};
use crate::relocation::{RelocationStrategy, save_relocating};
use crate::uniqueness::{ContactIndex, ScanContactIndex, ensure_unique_contact};

use super::{Customer, CustomerChanges, NewCustomer};

/// Service for managing customers.
pub struct CustomerService<B: TableBackend> {
    customers: TableRepository<Customer, B>,
    contacts: Arc<dyn ContactIndex>,
    publisher: Arc<dyn EventPublisher>,
    relocation: RelocationStrategy,
}

impl<B: TableBackend + Clone + 'static> CustomerService<B> {
    /// Creates a customer service whose uniqueness checks scan the
    /// customers table.
    pub fn new(backend: B, publisher: Arc<dyn EventPublisher>) -> Self {
        let customers = TableRepository::new(backend, CUSTOMERS_TABLE);
        Self {
            contacts: Arc::new(ScanContactIndex::new(customers.clone())),
            customers,
            publisher,
            relocation: RelocationStrategy::default(),
        }
    }
}

impl<B: TableBackend> CustomerService<B> {
    /// Replaces the contact index used for uniqueness checks.
    pub fn with_contact_index(mut self, contacts: Arc<dyn ContactIndex>) -> Self {
        self.contacts = contacts;
        self
    }

    /// Sets how city changes move customers between partitions.
    pub fn with_relocation_strategy(mut self, strategy: RelocationStrategy) -> Self {
        self.relocation = strategy;
        self
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &TableRepository<Customer, B> {
        &self.customers
    }

    /// Registers a new customer.
    #[tracing::instrument(skip(self, details), fields(city = %details.city))]
    pub async fn create(&self, details: NewCustomer) -> Result<Customer> {
        let details = details.normalized();
        details.validate()?;
        ensure_unique_contact(
            self.contacts.as_ref(),
            &details.email,
            details.phone.as_deref(),
            None,
        )
        .await?;

        let customer = self.customers.insert(&Customer::new(details)).await?;

        tracing::info!(key = %customer.key, "Customer created");
        metrics::counter!("customers_created_total").increment(1);

        publish_best_effort(
            self.publisher.as_ref(),
            &DomainEvent::customer_created(
                customer.key.unique_id.clone(),
                customer.key.partition_id.clone(),
                customer.full_name(),
            ),
        )
        .await;

        Ok(customer)
    }

    /// Loads a customer by key. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &EntityKey) -> Result<Option<Customer>> {
        Ok(self.customers.get(&key.partition_id, &key.unique_id).await?)
    }

    /// Lists customers, newest first, optionally only those in one city.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, city: Option<&str>) -> Result<Vec<Customer>> {
        let stream = match city.filter(|c| !c.trim().is_empty()) {
            Some(city) => self.customers.scan_partition(&city_partition(city)),
            None => self.customers.scan_all(),
        };
        let mut customers: Vec<Customer> = stream.try_collect().await?;
        customers.sort_by(|a, b| b.meta.last_modified.cmp(&a.meta.last_modified));
        Ok(customers)
    }

    /// Edits a customer, moving it to another partition when its city
    /// changes.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(&self, key: &EntityKey, changes: CustomerChanges) -> Result<Customer> {
        let mut customer = self.get(key).await?.ok_or_else(|| DomainError::NotFound {
            table: CUSTOMERS_TABLE.to_string(),
            key: key.clone(),
        })?;
        if let Some(etag) = changes.etag {
            customer.meta.etag = Some(etag);
        }

        let details = changes.customer.normalized();
        details.validate()?;
        ensure_unique_contact(
            self.contacts.as_ref(),
            &details.email,
            details.phone.as_deref(),
            Some(&customer.key.unique_id),
        )
        .await?;

        customer.apply(details);
        let new_partition = customer.expected_partition();
        let saved = save_relocating(&self.customers, customer, new_partition, self.relocation)
            .await?;

        tracing::info!(key = %saved.key, "Customer updated");
        Ok(saved)
    }

    /// Deletes a customer. Returns whether it existed.
    ///
    /// Orders placed by the customer are kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, key: &EntityKey) -> Result<bool> {
        let Some(customer) = self.get(key).await? else {
            return Ok(false);
        };

        self.customers
            .delete(&customer.key.partition_id, &customer.key.unique_id)
            .await?;
        tracing::info!(key = %customer.key, "Customer deleted");

        publish_best_effort(
            self.publisher.as_ref(),
            &DomainEvent::customer_deleted(
                customer.key.unique_id.clone(),
                customer.key.partition_id.clone(),
            ),
        )
        .await;

        Ok(true)
    }
}
