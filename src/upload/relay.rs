//! Relay transfer
//!
//! The whole file goes to the application backend as one multipart body; the
//! backend stores it and answers with the created record. Bounded by the
//! relay's request-size limit, which intake enforces before we get here.

use super::intake::SelectedFile;
use super::transfer::file_part;
use super::{TransferListener, TransferStrategy, UploadError, UploadMetadata, GENERIC_UPLOAD_FAILURE};
use crate::api::{ApiClient, ApiError};
use crate::config::StrategyKind;
use crate::models::{ContentId, ContentKind};
use async_trait::async_trait;
use std::sync::Arc;

pub struct RelayTransfer {
    api: Arc<ApiClient>,
    file_field: String,
}

impl RelayTransfer {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            file_field: "file".to_string(),
        }
    }

    /// Multipart field name carrying the file
    pub fn with_file_field(mut self, field: impl Into<String>) -> Self {
        self.file_field = field.into();
        self
    }
}

#[async_trait]
impl TransferStrategy for RelayTransfer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Relay
    }

    #[tracing::instrument(
        name = "upload.relay",
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
        let part = file_part(file, listener).await?;

        let mut form = reqwest::multipart::Form::new()
            .part(self.file_field.clone(), part)
            .text("title", metadata.title.clone())
            .text("description", metadata.description.clone());
        if let (ContentKind::Video, Some(duration)) = (content_kind, duration) {
            form = form.text("duration", duration.to_string());
        }

        let record = self
            .api
            .relay_upload(content_kind, form)
            .await
            .map_err(transfer_failure)?;

        let id = record.id().ok_or_else(|| {
            UploadError::TransferFailed("Backend response did not include a record id".into())
        })?;

        tracing::Span::current().record("content.id", id.as_str());
        tracing::info!(content_id = %id, "Relay upload accepted");
        Ok(id)
    }
}

/// Backend message when there is one, the generic text otherwise
fn transfer_failure(err: ApiError) -> UploadError {
    let detail = match &err {
        ApiError::Status { .. } | ApiError::Unauthorized(_) => err.detail(),
        _ => {
            tracing::warn!(error = %err, "Relay upload transport failure");
            GENERIC_UPLOAD_FAILURE.to_string()
        }
    };
    UploadError::TransferFailed(detail)
}
