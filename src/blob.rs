//! Blob storage collaborator boundary.
//!
//! The engine only depends on this contract; concrete backends (S3,
//! filesystem, ...) live in the host service.

use async_trait::async_trait;

use crate::Result;

/// An attachment payload as received from the caller, prior to upload.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// External binary store for message attachments.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store a blob under `path` and return a stable reference to it.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Delete a previously stored blob. Callers treat failures as
    /// non-fatal; the engine logs and continues.
    async fn delete(&self, blob_ref: &str) -> Result<()>;
}
