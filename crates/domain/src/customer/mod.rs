//! Customers, partitioned by city.

mod service;

pub use service::CustomerService;

use common::{EntityKey, PartitionId, city_partition};
use serde::{Deserialize, Serialize};
use table_store::{ETag, RowMetadata, TableEntity};

use crate::error::{DomainError, Result, require};

/// A stored customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(flatten)]
    pub key: EntityKey,
    #[serde(flatten)]
    pub meta: RowMetadata,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub city: String,
}

impl Customer {
    /// Builds an unsaved customer in its city partition with a fresh id.
    pub fn new(details: NewCustomer) -> Self {
        Self {
            key: EntityKey::generate(city_partition(&details.city)),
            meta: RowMetadata::unsaved(),
            first_name: details.first_name,
            last_name: details.last_name,
            email: details.email,
            phone: details.phone,
            city: details.city,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// The partition this customer belongs in given its current city.
    pub fn expected_partition(&self) -> PartitionId {
        city_partition(&self.city)
    }

    fn apply(&mut self, details: NewCustomer) {
        self.first_name = details.first_name;
        self.last_name = details.last_name;
        self.email = details.email;
        self.phone = details.phone;
        self.city = details.city;
    }
}

impl TableEntity for Customer {
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

/// Caller-supplied customer fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub city: String,
}

impl NewCustomer {
    /// Trims every field and drops a blank phone.
    pub fn normalized(self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            city: self.city.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        require("email", &self.email)?;
        if !self.email.contains('@') {
            return Err(DomainError::validation("email", "must be an email address"));
        }
        require("city", &self.city)
    }
}

/// An edit to an existing customer.
///
/// `etag`, when present, is the version the caller last saw and takes
/// precedence over the one just read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerChanges {
    #[serde(flatten)]
    pub customer: NewCustomer,
    #[serde(default)]
    pub etag: Option<ETag>,
}
