//! Named file share for contract documents.
//!
//! Unlike [`ObjectStorage`](crate::ObjectStorage), files here are addressed
//! by a human readable name that callers list, download and delete by.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{IntegrationError, Result};

/// A file as listed on the share.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedFile {
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Flat directory of named files.
#[async_trait]
pub trait FileShare: Send + Sync {
    /// Writes `data` under `name`, replacing any file of that name.
    async fn upload(&self, name: &str, data: Bytes) -> Result<()>;

    /// Lists at most `max` files in name order.
    async fn list(&self, max: usize) -> Result<Vec<SharedFile>>;

    /// Reads a file, or `None` when no file has that name.
    async fn download(&self, name: &str) -> Result<Option<Bytes>>;

    /// Deletes a file. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// Share name for an upload: `<base>_<random id><extension>`.
///
/// The base is the trimmed `display_name` when given, else the stem of
/// `file_name`, else `contract`. The extension always comes from
/// `file_name`.
pub fn shared_file_name(file_name: &str, display_name: Option<&str>) -> String {
    let path = Path::new(file_name);
    let base = display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| path.file_stem().and_then(|s| s.to_str()))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("contract");
    let id = Uuid::new_v4().simple();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{base}_{id}.{ext}"),
        _ => format!("{base}_{id}"),
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory file share for tests and local runs.
#[derive(Clone)]
pub struct InMemoryFileShare {
    share: String,
    files: Arc<RwLock<BTreeMap<String, StoredFile>>>,
    fail_on_upload: Arc<AtomicBool>,
    fail_on_delete: Arc<AtomicBool>,
}

impl InMemoryFileShare {
    /// Creates an empty share.
    pub fn new(share: impl Into<String>) -> Self {
        Self {
            share: share.into(),
            files: Arc::default(),
            fail_on_upload: Arc::new(AtomicBool::new(false)),
            fail_on_delete: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the share name.
    pub fn share(&self) -> &str {
        &self.share
    }

    /// Returns the number of stored files.
    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }

    /// Configures every subsequent upload to fail.
    pub fn set_fail_on_upload(&self, fail: bool) {
        self.fail_on_upload.store(fail, Ordering::SeqCst);
    }

    /// Configures every subsequent delete to fail.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.fail_on_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileShare for InMemoryFileShare {
    #[tracing::instrument(skip(self, data), fields(share = %self.share, size = data.len()))]
    async fn upload(&self, name: &str, data: Bytes) -> Result<()> {
        if self.fail_on_upload.load(Ordering::SeqCst) {
            return Err(IntegrationError::FileShare(format!(
                "share {} rejected {name}",
                self.share
            )));
        }

        let file = StoredFile {
            data,
            last_modified: Utc::now(),
        };
        self.files.write().await.insert(name.to_string(), file);
        Ok(())
    }

    async fn list(&self, max: usize) -> Result<Vec<SharedFile>> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .take(max)
            .map(|(name, file)| SharedFile {
                name: name.clone(),
                size: file.data.len() as u64,
                last_modified: Some(file.last_modified),
            })
            .collect())
    }

    async fn download(&self, name: &str) -> Result<Option<Bytes>> {
        Ok(self.files.read().await.get(name).map(|f| f.data.clone()))
    }

    #[tracing::instrument(skip(self), fields(share = %self.share))]
    async fn delete(&self, name: &str) -> Result<bool> {
        if self.fail_on_delete.load(Ordering::SeqCst) {
            return Err(IntegrationError::FileShare(format!(
                "share {} could not delete {name}",
                self.share
            )));
        }

        Ok(self.files.write().await.remove(name).is_some())
    }
}
