use std::sync::Arc;

use common::{EntityKey, PartitionId, UniqueId, category_partition};
use futures_util::TryStreamExt;
use integrations::{DomainEvent, EventPublisher, ObjectStorage, publish_best_effort};
use table_store::{TableBackend, TableRepository};

use crate::PRODUCTS_TABLE;
use crate::error::{DomainError, Result};
use crate::relocation::{RelocationStrategy, save_relocating};

use super::{Attachment, NewProduct, Product, ProductChanges};

/// Service for managing the product catalogue and product images.
pub struct ProductService<B: TableBackend> {
    products: TableRepository<Product, B>,
    storage: Arc<dyn ObjectStorage>,
    publisher: Arc<dyn EventPublisher>,
    relocation: RelocationStrategy,
}

impl<B: TableBackend> ProductService<B> {
    pub fn new(
        backend: B,
        storage: Arc<dyn ObjectStorage>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            products: TableRepository::new(backend, PRODUCTS_TABLE),
            storage,
            publisher,
            relocation: RelocationStrategy::default(),
        }
    }

    /// Sets how category changes move products between partitions.
    pub fn with_relocation_strategy(mut self, strategy: RelocationStrategy) -> Self {
        self.relocation = strategy;
        self
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &TableRepository<Product, B> {
        &self.products
    }

    /// Adds a product, storing its image first when one is given.
    #[tracing::instrument(skip(self, details, image), fields(category = %details.category))]
    pub async fn create(&self, details: NewProduct, image: Option<Attachment>) -> Result<Product> {
        let details = details.normalized();
        details.validate()?;

        let partition = category_partition(&details.category);
        self.ensure_unique_name(&partition, &details.name, None).await?;

        let image_url = match image {
            Some(image) => Some(self.storage.store(image.data, &image.file_name).await?),
            None => None,
        };

        let product = match self.products.insert(&Product::new(details, image_url.clone())).await {
            Ok(product) => product,
            Err(e) => {
                if let Some(url) = &image_url {
                    self.remove_image_best_effort(url).await;
                }
                return Err(e.into());
            }
        };

        tracing::info!(key = %product.key, "Product created");
        metrics::counter!("products_created_total").increment(1);

        publish_best_effort(
            self.publisher.as_ref(),
            &DomainEvent::product_created(
                product.key.unique_id.clone(),
                product.key.partition_id.clone(),
                product.name.clone(),
                product.price,
                product.has_image(),
            ),
        )
        .await;
        if let Some(url) = &product.image_url {
            publish_best_effort(
                self.publisher.as_ref(),
                &DomainEvent::product_image_uploaded(product.key.unique_id.clone(), url.clone()),
            )
            .await;
        }

        Ok(product)
    }

    /// Loads a product by key. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &EntityKey) -> Result<Option<Product>> {
        Ok(self.products.get(&key.partition_id, &key.unique_id).await?)
    }

    /// Lists products, newest first, optionally only one category.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, category: Option<&str>) -> Result<Vec<Product>> {
        let stream = match category.filter(|c| !c.trim().is_empty()) {
            Some(category) => self.products.scan_partition(&category_partition(category)),
            None => self.products.scan_all(),
        };
        let mut products: Vec<Product> = stream.try_collect().await?;
        products.sort_by(|a, b| b.meta.last_modified.cmp(&a.meta.last_modified));
        Ok(products)
    }

    /// Edits a product.
    ///
    /// A new image is stored before the save and the old object is removed
    /// only once the save succeeded; a rejected save removes the new object
    /// instead. A category change moves the product to the new category's
    /// partition.
    #[tracing::instrument(skip(self, changes, image))]
    pub async fn update(
        &self,
        key: &EntityKey,
        changes: ProductChanges,
        image: Option<Attachment>,
    ) -> Result<Product> {
        let mut product = self.get(key).await?.ok_or_else(|| DomainError::NotFound {
            table: PRODUCTS_TABLE.to_string(),
            key: key.clone(),
        })?;

        let changes = changes.normalized();
        changes.validate()?;
        if let Some(etag) = changes.etag {
            product.meta.etag = Some(etag);
        }

        let target = match &changes.category {
            Some(category) => category_partition(category),
            None => product.key.partition_id.clone(),
        };
        self.ensure_unique_name(&target, &changes.name, Some(&product.key.unique_id))
            .await?;

        let previous_image = product.image_url.clone();
        let new_image = match image {
            Some(image) => {
                let url = self.storage.store(image.data, &image.file_name).await?;
                product.image_url = Some(url.clone());
                Some(url)
            }
            None => None,
        };

        product.name = changes.name;
        product.description = changes.description;
        product.price = changes.price;
        product.stock_quantity = changes.stock_quantity;
        if let Some(category) = changes.category {
            product.category = category;
        }

        let saved = match save_relocating(&self.products, product, target, self.relocation).await {
            Ok(saved) => saved,
            Err(e) => {
                // A half-done move may have stored a row that points at the new image.
                if let Some(url) = &new_image
                    && !matches!(e, DomainError::RelocationInconsistency { .. })
                {
                    self.remove_image_best_effort(url).await;
                }
                return Err(e);
            }
        };
        tracing::info!(key = %saved.key, "Product updated");

        if let Some(url) = new_image {
            let event = match previous_image {
                Some(old) => {
                    self.remove_image_best_effort(&old).await;
                    DomainEvent::product_image_replaced(saved.key.unique_id.clone(), url)
                }
                None => DomainEvent::product_image_uploaded(saved.key.unique_id.clone(), url),
            };
            publish_best_effort(self.publisher.as_ref(), &event).await;
        }

        Ok(saved)
    }

    /// Replaces only the product's image, or attaches the first one.
    pub async fn replace_image(&self, key: &EntityKey, image: Attachment) -> Result<Product> {
        let product = self.get(key).await?.ok_or_else(|| DomainError::NotFound {
            table: PRODUCTS_TABLE.to_string(),
            key: key.clone(),
        })?;
        let mut changes = ProductChanges::unchanged(&product);
        changes.etag = product.meta.etag.clone();
        self.update(key, changes, Some(image)).await
    }

    /// Deletes a product and its image. Returns whether it existed.
    ///
    /// The image goes first; if it cannot be removed it is left orphaned
    /// and the product is deleted anyway.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, key: &EntityKey) -> Result<bool> {
        let Some(product) = self.get(key).await? else {
            return Ok(false);
        };

        if let Some(url) = &product.image_url {
            self.remove_image_best_effort(url).await;
        }
        self.products
            .delete(&product.key.partition_id, &product.key.unique_id)
            .await?;
        tracing::info!(key = %product.key, "Product deleted");

        publish_best_effort(
            self.publisher.as_ref(),
            &DomainEvent::product_deleted(
                product.key.unique_id.clone(),
                product.key.partition_id.clone(),
            ),
        )
        .await;

        Ok(true)
    }

    /// Fails if another product in `partition` already has `name`
    /// (case-insensitive). Not atomic with the following write.
    async fn ensure_unique_name(
        &self,
        partition: &PartitionId,
        name: &str,
        exclude: Option<&UniqueId>,
    ) -> Result<()> {
        let wanted = name.to_lowercase();
        let mut products = self.products.scan_partition(partition);
        while let Some(product) = products.try_next().await? {
            if Some(&product.key.unique_id) != exclude && product.name.to_lowercase() == wanted {
                return Err(DomainError::validation(
                    "name",
                    "a product with this name already exists in the category",
                ));
            }
        }
        Ok(())
    }

    async fn remove_image_best_effort(&self, url: &str) {
        match self.storage.remove(url).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(url, "Image already absent"),
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to remove image, leaving it orphaned");
                metrics::counter!("orphaned_attachments_total").increment(1);
            }
        }
    }
}
