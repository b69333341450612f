//! Contact-detail uniqueness across all customers.
//!
//! The check runs before the write and is not atomic with it: two requests
//! carrying the same email can both pass and both insert.

use async_trait::async_trait;
use common::UniqueId;
use futures_util::TryStreamExt;
use table_store::{TableBackend, TableRepository};

use crate::customer::Customer;
use crate::error::{DomainError, Result};

/// Which contact detail collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Email,
    Phone,
}

impl ContactField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactField::Email => "email",
            ContactField::Phone => "phone",
        }
    }
}

/// Lookup of customers by contact detail.
#[async_trait]
pub trait ContactIndex: Send + Sync {
    /// Returns the first contact field already used by another customer.
    ///
    /// Comparison is case-insensitive; the customer identified by `exclude`
    /// is ignored so an entity never conflicts with itself.
    async fn find_conflict(
        &self,
        email: &str,
        phone: Option<&str>,
        exclude: Option<&UniqueId>,
    ) -> Result<Option<ContactField>>;
}

/// [`ContactIndex`] answered by a full scan of the customers table.
pub struct ScanContactIndex<B: TableBackend> {
    customers: TableRepository<Customer, B>,
}

impl<B: TableBackend> ScanContactIndex<B> {
    pub fn new(customers: TableRepository<Customer, B>) -> Self {
        Self { customers }
    }
}

#[async_trait]
impl<B: TableBackend + 'static> ContactIndex for ScanContactIndex<B> {
    #[tracing::instrument(skip(self, email, phone))]
    async fn find_conflict(
        &self,
        email: &str,
        phone: Option<&str>,
        exclude: Option<&UniqueId>,
    ) -> Result<Option<ContactField>> {
        let email = email.to_lowercase();
        let phone = phone.map(str::to_lowercase);

        let mut customers = self.customers.scan_all();
        while let Some(customer) = customers.try_next().await? {
            if Some(&customer.key.unique_id) == exclude {
                continue;
            }
            if customer.email.to_lowercase() == email {
                return Ok(Some(ContactField::Email));
            }
            if let (Some(wanted), Some(existing)) = (&phone, &customer.phone)
                && existing.to_lowercase() == *wanted
            {
                return Ok(Some(ContactField::Phone));
            }
        }
        Ok(None)
    }
}

/// Fails with a field-level `ValidationFailed` if the contact details are
/// taken by another customer.
pub async fn ensure_unique_contact(
    index: &dyn ContactIndex,
    email: &str,
    phone: Option<&str>,
    exclude: Option<&UniqueId>,
) -> Result<()> {
    match index.find_conflict(email, phone, exclude).await? {
        Some(field) => Err(DomainError::validation(
            field.as_str(),
            format!("{} is already in use", field.as_str()),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::NewCustomer;
    use table_store::InMemoryTableBackend;

    async fn index_with_jane() -> (ScanContactIndex<InMemoryTableBackend>, Customer) {
        let repo = TableRepository::new(InMemoryTableBackend::new(), crate::CUSTOMERS_TABLE);
        let jane = repo
            .insert(&Customer::new(NewCustomer {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                email: "Jane@Example.com".to_string(),
                phone: Some("031 555 0100".to_string()),
                city: "Durban".to_string(),
            }))
            .await
            .unwrap();
        (ScanContactIndex::new(repo), jane)
    }

    #[tokio::test]
    async fn email_match_is_case_insensitive() {
        let (index, _) = index_with_jane().await;
        let conflict = index
            .find_conflict("jane@example.COM", None, None)
            .await
            .unwrap();
        assert_eq!(conflict, Some(ContactField::Email));
    }

    #[tokio::test]
    async fn phone_conflict_is_reported() {
        let (index, _) = index_with_jane().await;
        let conflict = index
            .find_conflict("other@example.com", Some("031 555 0100"), None)
            .await
            .unwrap();
        assert_eq!(conflict, Some(ContactField::Phone));
    }

    #[tokio::test]
    async fn own_record_is_excluded() {
        let (index, jane) = index_with_jane().await;
        let conflict = index
            .find_conflict("jane@example.com", Some("031 555 0100"), Some(&jane.key.unique_id))
            .await
            .unwrap();
        assert_eq!(conflict, None);
    }

    #[tokio::test]
    async fn ensure_unique_maps_to_validation_failure() {
        let (index, _) = index_with_jane().await;
        let result = ensure_unique_contact(&index, "JANE@example.com", None, None).await;
        assert!(matches!(
            result,
            Err(DomainError::ValidationFailed { field: "email", .. })
        ));

        ensure_unique_contact(&index, "john@example.com", None, None)
            .await
            .unwrap();
    }
}
