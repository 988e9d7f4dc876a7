//! Mock blob storage for testing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::blob::BlobStorage;
use crate::{Result, SupportError};

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

/// Mock implementation of the [`BlobStorage`] trait.
///
/// Provides controllable behavior for testing:
/// - retains stored blobs for round-trip assertions
/// - records delete attempts
/// - fails the n-th put, all deletes, or delays puts past a timeout
#[derive(Debug, Default)]
pub struct MockBlobStorage {
    blobs: RwLock<HashMap<String, StoredBlob>>,
    order: RwLock<Vec<String>>,
    delete_attempts: RwLock<Vec<String>>,
    put_calls: RwLock<u32>,
    fail_put_at: RwLock<Option<u32>>,
    fail_deletes: RwLock<bool>,
    put_delay: RwLock<Option<Duration>>,
}

impl MockBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the n-th `put` call (1-indexed) fail.
    pub async fn fail_put_at(&self, call: u32) {
        *self.fail_put_at.write().await = Some(call);
    }

    /// Make every `delete` call fail.
    pub async fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write().await = fail;
    }

    /// Delay every `put` call, for timeout tests.
    pub async fn delay_puts(&self, delay: Duration) {
        *self.put_delay.write().await = Some(delay);
    }

    /// References currently stored, in upload order.
    pub async fn stored_refs(&self) -> Vec<String> {
        let blobs = self.blobs.read().await;
        self.order
            .read()
            .await
            .iter()
            .filter(|r| blobs.contains_key(*r))
            .cloned()
            .collect()
    }

    /// Every delete attempt, successful or not.
    pub async fn deleted_refs(&self) -> Vec<String> {
        self.delete_attempts.read().await.clone()
    }

    pub async fn put_calls(&self) -> u32 {
        *self.put_calls.read().await
    }

    pub async fn contains(&self, blob_ref: &str) -> bool {
        self.blobs.read().await.contains_key(blob_ref)
    }

    /// Retrieve a stored blob's bytes, if present.
    pub async fn get(&self, blob_ref: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(blob_ref).map(|b| b.bytes.clone())
    }

    pub async fn content_type(&self, blob_ref: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .get(blob_ref)
            .map(|b| b.content_type.clone())
    }
}

#[async_trait]
impl BlobStorage for MockBlobStorage {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let call = {
            let mut calls = self.put_calls.write().await;
            *calls += 1;
            *calls
        };

        if let Some(delay) = *self.put_delay.read().await {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_put_at.read().await == Some(call) {
            return Err(SupportError::Upload("simulated storage failure".to_string()));
        }

        self.blobs.write().await.insert(
            path.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        self.order.write().await.push(path.to_string());
        Ok(path.to_string())
    }

    async fn delete(&self, blob_ref: &str) -> Result<()> {
        self.delete_attempts.write().await.push(blob_ref.to_string());

        if *self.fail_deletes.read().await {
            return Err(SupportError::Upload("simulated delete failure".to_string()));
        }

        // Deleting an absent blob is a no-op; compensation is idempotent.
        self.blobs.write().await.remove(blob_ref);
        Ok(())
    }
}
