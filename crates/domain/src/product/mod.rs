//! Products, partitioned by category.

mod service;

pub use service::ProductService;

use bytes::Bytes;
use common::{EntityKey, category_partition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use table_store::{ETag, RowMetadata, TableEntity};

use crate::error::{DomainError, Result, require};

/// A stored product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(flatten)]
    pub key: EntityKey,
    #[serde(flatten)]
    pub meta: RowMetadata,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Product {
    /// Builds an unsaved product in its category partition with a fresh id.
    pub fn new(details: NewProduct, image_url: Option<String>) -> Self {
        Self {
            key: EntityKey::generate(category_partition(&details.category)),
            meta: RowMetadata::unsaved(),
            category: details.category,
            name: details.name,
            description: details.description,
            price: details.price,
            stock_quantity: details.stock_quantity,
            image_url,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }
}

impl TableEntity for Product {
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

/// Caller-supplied product fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
}

impl NewProduct {
    /// Trims text fields and drops a blank description.
    pub fn normalized(self) -> Self {
        Self {
            category: self.category.trim().to_string(),
            name: self.name.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("category", &self.category)?;
        require("name", &self.name)?;
        validate_amounts(self.price, self.stock_quantity)
    }
}

/// An edit to an existing product.
///
/// A `category` different from the current one moves the product to the
/// new category's partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductChanges {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub etag: Option<ETag>,
}

impl ProductChanges {
    /// Changes that leave every field as it is.
    pub fn unchanged(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            stock_quantity: product.stock_quantity,
            category: None,
            etag: None,
        }
    }

    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            category: self
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        validate_amounts(self.price, self.stock_quantity)
    }
}

/// An uploaded file to attach to a product.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub data: Bytes,
    pub file_name: String,
}

impl Attachment {
    pub fn new(data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            file_name: file_name.into(),
        }
    }
}

fn validate_amounts(price: Decimal, stock_quantity: i32) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(DomainError::validation("price", "must be greater than 0"));
    }
    if stock_quantity < 0 {
        return Err(DomainError::validation("stock_quantity", "must not be negative"));
    }
    Ok(())
}
