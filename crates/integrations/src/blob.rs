//! Object storage for product images.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{IntegrationError, Result};

/// Opaque attachment store.
///
/// Objects are addressed by the locator returned from `store`; callers keep
/// the locator on the owning entity and never build one themselves.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `data` under a fresh name derived from `suggested_name` and
    /// returns its locator.
    async fn store(&self, data: Bytes, suggested_name: &str) -> Result<String>;

    /// Removes the object behind `locator`. Returns whether it existed.
    async fn remove(&self, locator: &str) -> Result<bool>;
}

/// Object name for an upload: a random id plus the original extension.
pub fn object_name(suggested_name: &str) -> String {
    let id = Uuid::new_v4().simple();
    match Path::new(suggested_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{id}.{ext}"),
        _ => id.to_string(),
    }
}

/// In-memory object storage for tests and local runs.
///
/// Locators have the form `memory://<container>/<object name>`.
#[derive(Clone)]
pub struct InMemoryObjectStorage {
    container: String,
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    fail_on_store: Arc<AtomicBool>,
    fail_on_remove: Arc<AtomicBool>,
}

impl InMemoryObjectStorage {
    /// Creates an empty store for `container`.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            objects: Arc::default(),
            fail_on_store: Arc::new(AtomicBool::new(false)),
            fail_on_remove: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Returns the bytes behind a locator, if present.
    pub async fn get(&self, locator: &str) -> Option<Bytes> {
        self.objects.read().await.get(locator).cloned()
    }

    /// Returns the number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Configures every subsequent store to fail.
    pub fn set_fail_on_store(&self, fail: bool) {
        self.fail_on_store.store(fail, Ordering::SeqCst);
    }

    /// Configures every subsequent remove to fail.
    pub fn set_fail_on_remove(&self, fail: bool) {
        self.fail_on_remove.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    #[tracing::instrument(skip(self, data), fields(container = %self.container, size = data.len()))]
    async fn store(&self, data: Bytes, suggested_name: &str) -> Result<String> {
        if self.fail_on_store.load(Ordering::SeqCst) {
            return Err(IntegrationError::Storage(format!(
                "container {} rejected {suggested_name}",
                self.container
            )));
        }

        let locator = format!("memory://{}/{}", self.container, object_name(suggested_name));
        self.objects.write().await.insert(locator.clone(), data);
        Ok(locator)
    }

    #[tracing::instrument(skip(self), fields(container = %self.container))]
    async fn remove(&self, locator: &str) -> Result<bool> {
        if self.fail_on_remove.load(Ordering::SeqCst) {
            return Err(IntegrationError::Storage(format!(
                "container {} could not remove {locator}",
                self.container
            )));
        }

        Ok(self.objects.write().await.remove(locator).is_some())
    }
}
