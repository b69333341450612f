//! Contract documents kept on the file share.

use std::sync::Arc;

use bytes::Bytes;
use integrations::{
    DomainEvent, EventPublisher, FileShare, SharedFile, publish_best_effort, shared_file_name,
};

use crate::error::{DomainError, Result};
use crate::product::Attachment;

/// Most files returned by [`ContractService::list`].
pub const MAX_LISTED_CONTRACTS: usize = 500;

/// Service for uploading, listing and removing contract documents.
pub struct ContractService {
    files: Arc<dyn FileShare>,
    publisher: Arc<dyn EventPublisher>,
}

impl ContractService {
    pub fn new(files: Arc<dyn FileShare>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { files, publisher }
    }

    /// Puts a document on the share under a fresh name and returns that name.
    ///
    /// The name is built from `display_name` when given, else from the
    /// uploaded file's stem; see [`shared_file_name`].
    #[tracing::instrument(skip(self, file), fields(size = file.data.len()))]
    pub async fn upload(&self, file: Attachment, display_name: Option<&str>) -> Result<String> {
        if file.data.is_empty() {
            return Err(DomainError::validation("file", "is required"));
        }

        let name = shared_file_name(&file.file_name, display_name);
        self.files.upload(&name, file.data).await?;

        tracing::info!(name = %name, "Contract uploaded");
        metrics::counter!("contracts_uploaded_total").increment(1);
        publish_best_effort(self.publisher.as_ref(), &DomainEvent::contract_uploaded(&name)).await;
        Ok(name)
    }

    /// Lists the share, capped at [`MAX_LISTED_CONTRACTS`].
    pub async fn list(&self) -> Result<Vec<SharedFile>> {
        Ok(self.files.list(MAX_LISTED_CONTRACTS).await?)
    }

    /// Reads a document by its share name.
    pub async fn download(&self, name: &str) -> Result<Bytes> {
        require_name(name)?;
        self.files
            .download(name)
            .await?
            .ok_or_else(|| DomainError::FileNotFound(name.to_string()))
    }

    /// Removes a document. Returns whether it existed; `contract-deleted` is
    /// only published when it did.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool> {
        require_name(name)?;
        if !self.files.delete(name).await? {
            return Ok(false);
        }

        tracing::info!(name, "Contract deleted");
        publish_best_effort(self.publisher.as_ref(), &DomainEvent::contract_deleted(name)).await;
        Ok(true)
    }
}

fn require_name(name: &str) -> Result<()> {
    crate::error::require("name", name)
}
