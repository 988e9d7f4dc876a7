//! Attachment consistency saga: UploadAll -> commit -> CompensateDeleteAll.
//!
//! Uploads always complete before the relational transaction opens so no
//! lock is held across slow network calls. Any failure after at least one
//! successful upload triggers best-effort deletion of everything uploaded
//! in the same batch; compensation failures are logged and swallowed so
//! the caller only ever observes the root error.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::blob::{AttachmentUpload, BlobStorage};
use crate::policy::AttachmentPolicy;
use crate::{Result, SupportError};

pub struct AttachmentSaga {
    blobs: Arc<dyn BlobStorage>,
    policy: AttachmentPolicy,
    upload_timeout: Duration,
}

impl AttachmentSaga {
    pub fn new(
        blobs: Arc<dyn BlobStorage>,
        policy: AttachmentPolicy,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            blobs,
            policy,
            upload_timeout,
        }
    }

    /// Batch validation; must pass before any upload is attempted.
    pub fn validate(&self, attachments: &[AttachmentUpload]) -> Result<()> {
        self.policy.validate_batch(attachments)
    }

    /// Upload the batch sequentially. On any failure (including a
    /// timeout) the uploads that already succeeded in this call are
    /// compensated and the root error is returned; no blob from a failed
    /// batch outlives the call.
    pub async fn upload_all(
        &self,
        ticket_id: Uuid,
        attachments: &[AttachmentUpload],
    ) -> Result<Vec<String>> {
        let mut uploaded: Vec<String> = Vec::with_capacity(attachments.len());

        for upload in attachments {
            let path = blob_path(ticket_id, &upload.filename);
            let put = self
                .blobs
                .put(&path, upload.bytes.clone(), &upload.content_type);

            let result = match tokio::time::timeout(self.upload_timeout, put).await {
                Ok(result) => result,
                Err(_) => Err(SupportError::Upload(format!(
                    "upload of '{}' timed out",
                    upload.filename
                ))),
            };

            match result {
                Ok(blob_ref) => uploaded.push(blob_ref),
                Err(e) => {
                    let root = SupportError::Upload(match e {
                        SupportError::Upload(msg) => msg,
                        other => other.to_string(),
                    });
                    self.compensate(&uploaded).await;
                    return Err(root);
                }
            }
        }

        Ok(uploaded)
    }

    /// Best-effort, idempotent deletion of uploaded blobs. Failures are
    /// logged and never re-thrown.
    pub async fn compensate(&self, blob_refs: &[String]) {
        for blob_ref in blob_refs {
            let delete = self.blobs.delete(blob_ref);
            match tokio::time::timeout(self.upload_timeout, delete).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(blob_ref = %blob_ref, "Attachment compensation failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(blob_ref = %blob_ref, "Attachment compensation timed out");
                }
            }
        }
    }
}

/// Storage path for an attachment. The id segment keeps same-named files
/// from colliding within a ticket.
fn blob_path(ticket_id: Uuid, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("tickets/{}/{}-{}", ticket_id, Uuid::new_v4(), safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBlobStorage;

    fn file(name: &str) -> AttachmentUpload {
        AttachmentUpload {
            filename: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    fn saga(blobs: Arc<MockBlobStorage>) -> AttachmentSaga {
        AttachmentSaga::new(blobs, AttachmentPolicy::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn uploads_whole_batch_in_order() {
        let blobs = Arc::new(MockBlobStorage::new());
        let ticket_id = Uuid::new_v4();

        let refs = saga(blobs.clone())
            .upload_all(ticket_id, &[file("a.png"), file("b.png")])
            .await
            .unwrap();

        assert_eq!(refs.len(), 2);
        assert!(refs[0].contains(&ticket_id.to_string()));
        assert!(refs[0].ends_with("a.png"));
        assert!(refs[1].ends_with("b.png"));
        assert_eq!(blobs.stored_refs().await, refs);
    }

    #[tokio::test]
    async fn failed_upload_compensates_earlier_siblings() {
        let blobs = Arc::new(MockBlobStorage::new());
        blobs.fail_put_at(2).await;

        let err = saga(blobs.clone())
            .upload_all(Uuid::new_v4(), &[file("a.png"), file("b.png"), file("c.png")])
            .await
            .unwrap_err();

        assert!(matches!(err, SupportError::Upload(_)));
        // first two uploads were deleted again, third never happened
        assert!(blobs.stored_refs().await.is_empty());
        assert_eq!(blobs.deleted_refs().await.len(), 2);
    }

    #[tokio::test]
    async fn compensation_failure_is_swallowed() {
        let blobs = Arc::new(MockBlobStorage::new());
        blobs.fail_put_at(1).await;
        blobs.fail_deletes(true).await;

        let err = saga(blobs.clone())
            .upload_all(Uuid::new_v4(), &[file("a.png"), file("b.png")])
            .await
            .unwrap_err();

        // the caller still sees the original upload error
        assert!(matches!(err, SupportError::Upload(_)));
        // the delete was attempted even though it failed
        assert_eq!(blobs.deleted_refs().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_batch_never_touches_storage() {
        let blobs = Arc::new(MockBlobStorage::new());
        let s = saga(blobs.clone());

        let six: Vec<_> = (0..6).map(|i| file(&format!("f{i}.png"))).collect();
        assert!(matches!(s.validate(&six), Err(SupportError::Validation(_))));
        assert_eq!(blobs.put_calls().await, 0);
    }

    #[tokio::test]
    async fn slow_upload_times_out_and_compensates() {
        let blobs = Arc::new(MockBlobStorage::new());
        blobs.delay_puts(Duration::from_millis(200)).await;

        let s = AttachmentSaga::new(
            blobs.clone(),
            AttachmentPolicy::default(),
            Duration::from_millis(20),
        );

        // first file delayed past the deadline
        let err = s
            .upload_all(Uuid::new_v4(), &[file("a.png")])
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::Upload(_)));
    }
}
