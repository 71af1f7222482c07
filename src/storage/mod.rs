//! Object storage client
//!
//! Uploads a file straight to a Cloudinary-style endpoint using a signed
//! credential obtained from the backend. The application backend never sees
//! the file body on this path, so its request-size limit does not apply.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | Upload | `storage.upload` | cloud_name, resource_type, folder, bytes, public_id, status_code |

use crate::api::error_message;
use crate::config::StorageConfig;
use crate::models::{StorageUploadResult, UploadSignature};
use thiserror::Error;

/// Storage client errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Storage rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Response error: {0}")]
    ResponseError(String),
}

impl StorageError {
    /// Most specific human-readable detail
    pub fn detail(&self) -> String {
        match self {
            StorageError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Direct-upload storage client
#[derive(Debug, Clone)]
pub struct StorageClient {
    upload_base_url: String,
    http_client: reqwest::Client,
}

impl StorageClient {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            upload_base_url: config.upload_base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// `{base}/{cloudName}/{resourceType}/upload`
    pub fn upload_url(&self, signature: &UploadSignature) -> String {
        format!(
            "{}/{}/{}/upload",
            self.upload_base_url, signature.cloud_name, signature.resource_type
        )
    }

    /// Upload `file` with the signed form fields
    #[tracing::instrument(
        name = "storage.upload",
        skip(self, signature, file),
        fields(
            storage.cloud_name = %signature.cloud_name,
            storage.resource_type = %signature.resource_type,
            storage.folder = %signature.folder,
            upload.bytes = bytes,
            storage.public_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        signature: &UploadSignature,
        file: reqwest::multipart::Part,
        bytes: u64,
    ) -> Result<StorageUploadResult, StorageError> {
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", signature.api_key.clone())
            .text("timestamp", signature.timestamp.clone())
            .text("signature", signature.signature.clone())
            .text("folder", signature.folder.clone());

        let response = self
            .http_client
            .post(self.upload_url(signature))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("http.status_code", status.as_u16());

        let body = response.text().await?;
        if !status.is_success() {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let result: StorageUploadResult = serde_json::from_str(&body)
            .map_err(|e| StorageError::ResponseError(e.to_string()))?;

        span.record("storage.public_id", result.public_id.as_str());
        tracing::info!(
            public_id = %result.public_id,
            bytes = result.bytes,
            format = ?result.format,
            "Storage upload completed"
        );

        Ok(result)
    }
}
