//! Direct transfer
//!
//! Three steps:
//!
//! 1. fetch a signed credential from the backend,
//! 2. send the file straight to object storage with it,
//! 3. tell the backend where the object landed so it creates the record.
//!
//! A failure in step 3 leaves an object in storage with no record pointing at
//! it, so it is reported as [`UploadError::RecordSaveFailed`] rather than a
//! plain transfer failure.

use super::intake::SelectedFile;
use super::transfer::file_part;
use super::{TransferListener, TransferStrategy, UploadError, UploadMetadata, GENERIC_UPLOAD_FAILURE};
use crate::api::{ApiClient, ApiError};
use crate::config::StrategyKind;
use crate::models::{ContentId, ContentKind, SaveUploadedRequest};
use crate::storage::{StorageClient, StorageError};
use async_trait::async_trait;
use std::sync::Arc;

pub struct DirectTransfer {
    api: Arc<ApiClient>,
    storage: StorageClient,
}

impl DirectTransfer {
    pub fn new(api: Arc<ApiClient>, storage: StorageClient) -> Self {
        Self { api, storage }
    }
}

#[async_trait]
impl TransferStrategy for DirectTransfer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    #[tracing::instrument(
        name = "upload.direct",
        skip(self, file, metadata, listener),
        fields(
            content.kind = %content_kind,
            upload.file = %file.name,
            upload.bytes = file.byte_size,
            content.id = tracing::field::Empty
        ),
        err
    )]
    async fn transfer(
        &self,
        content_kind: ContentKind,
        file: &SelectedFile,
        metadata: &UploadMetadata,
        duration: Option<f64>,
        listener: Arc<dyn TransferListener>,
    ) -> Result<ContentId, UploadError> {
        let signature = self
            .api
            .upload_signature(content_kind)
            .await
            .map_err(signature_failure)?;

        let part = file_part(file, listener.clone()).await?;
        let stored = self
            .storage
            .upload(&signature, part, file.byte_size)
            .await
            .map_err(storage_failure)?;

        listener.storage_complete();

        let body = SaveUploadedRequest {
            title: metadata.title.clone(),
            description: metadata.description.clone(),
            cloudinary_url: stored.secure_url.clone(),
            public_id: stored.public_id.clone(),
            filesize: if stored.bytes > 0 {
                stored.bytes
            } else {
                file.byte_size
            },
            duration: match content_kind {
                ContentKind::Video => duration.or(stored.duration),
                ContentKind::Photo => None,
            },
            format: stored.format.clone(),
        };

        let record = self
            .api
            .save_uploaded(content_kind, &body)
            .await
            .map_err(|e| {
                tracing::error!(
                    public_id = %stored.public_id,
                    error = %e,
                    "Object stored but record save failed"
                );
                UploadError::RecordSaveFailed {
                    public_id: stored.public_id.clone(),
                    detail: e.detail(),
                }
            })?;

        let id = record.id().ok_or_else(|| UploadError::RecordSaveFailed {
            public_id: stored.public_id.clone(),
            detail: "backend response did not include a record id".into(),
        })?;

        tracing::Span::current().record("content.id", id.as_str());
        tracing::info!(content_id = %id, public_id = %stored.public_id, "Direct upload saved");
        Ok(id)
    }
}

fn signature_failure(err: ApiError) -> UploadError {
    let detail = match &err {
        ApiError::Status { .. } | ApiError::Unauthorized(_) => err.detail(),
        _ => {
            tracing::warn!(error = %err, "Could not obtain upload signature");
            GENERIC_UPLOAD_FAILURE.to_string()
        }
    };
    UploadError::TransferFailed(detail)
}

fn storage_failure(err: StorageError) -> UploadError {
    let detail = match &err {
        StorageError::Rejected { .. } => err.detail(),
        _ => {
            tracing::warn!(error = %err, "Storage upload transport failure");
            GENERIC_UPLOAD_FAILURE.to_string()
        }
    };
    UploadError::TransferFailed(detail)
}
