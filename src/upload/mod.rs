//! Upload module
//!
//! Drives one upload from file selection to the end of server-side
//! moderation processing:
//!
//! ```text
//! intake ──► transfer (relay | direct) ──► poller ──► completed / failed
//!                 │ bytes                     │ percent
//!                 ▼                           ▼
//!           transfer_progress           server_progress ──► reconciler ──► visual_progress
//! ```
//!
//! [`controller::UploadController`] owns the session and wires the pieces
//! together; each piece is usable and testable on its own.

use crate::config::StrategyKind;
use crate::models::{ContentId, ContentKind};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod controller;
pub mod direct;
pub mod intake;
pub mod poller;
pub mod reconciler;
pub mod relay;
pub mod session;
pub mod transfer;

pub use controller::{CompletionHook, UploadController, UploadOutcome};
pub use direct::DirectTransfer;
pub use intake::{DurationProbe, FfprobeDurationProbe, SelectedFile, UploadIntake};
pub use poller::{PollOutcome, ProcessingPoller, ProcessingReport, StatusSource};
pub use reconciler::{reconcile, ProgressReconciler};
pub use relay::RelayTransfer;
pub use session::{SessionHandle, UploadSession, UploadStage};

/// Shown when the transport gives nothing more specific
pub const GENERIC_UPLOAD_FAILURE: &str = "Upload failed. Please try again.";

/// Shown when the backend marks processing failed without a reason
pub const GENERIC_PROCESSING_FAILURE: &str = "Processing failed";

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Please select a valid {kind} file ({allowed}); got '{mime_type}'")]
    InvalidType {
        kind: ContentKind,
        mime_type: String,
        allowed: String,
    },

    #[error("File size {size} bytes exceeds the {max} byte limit for {strategy} {kind} uploads")]
    FileTooLarge {
        size: u64,
        max: u64,
        kind: ContentKind,
        strategy: &'static str,
    },

    #[error("Selected file is empty")]
    EmptyFile,

    #[error("Please select a {0} file")]
    NoFileSelected(ContentKind),

    #[error("Please enter a title")]
    MissingTitle,

    #[error("An upload is already in progress")]
    AlreadyInProgress,

    #[error("{0}")]
    TransferFailed(String),

    #[error("File was stored as '{public_id}' but saving the record failed: {detail}. Please retry the upload.")]
    RecordSaveFailed { public_id: String, detail: String },

    #[error("{0}")]
    ProcessingFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used for metrics labels and callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidType,
    FileTooLarge,
    InvalidInput,
    TransferFailed,
    RecordSaveFailed,
    ProcessingFailed,
    PollTransientError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidType => "invalid_type",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::TransferFailed => "transfer_failed",
            ErrorKind::RecordSaveFailed => "record_save_failed",
            ErrorKind::ProcessingFailed => "processing_failed",
            ErrorKind::PollTransientError => "poll_transient_error",
        }
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::InvalidType { .. } => ErrorKind::InvalidType,
            UploadError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            UploadError::EmptyFile
            | UploadError::NoFileSelected(_)
            | UploadError::MissingTitle
            | UploadError::AlreadyInProgress => ErrorKind::InvalidInput,
            UploadError::TransferFailed(_) | UploadError::Io(_) => ErrorKind::TransferFailed,
            UploadError::RecordSaveFailed { .. } => ErrorKind::RecordSaveFailed,
            UploadError::ProcessingFailed(_) => ErrorKind::ProcessingFailed,
        }
    }
}

/// User-entered metadata for the content record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
}

impl UploadMetadata {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Receives transfer events. Called from the transport's task.
pub trait TransferListener: Send + Sync {
    /// `sent` of `total` body bytes have been handed to the transport
    fn bytes_sent(&self, sent: u64, total: u64);

    /// Bytes are in object storage; only the record-save call remains
    fn storage_complete(&self) {}
}

/// Moves a validated file to durable storage and returns the new record's id
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn transfer(
        &self,
        content_kind: ContentKind,
        file: &SelectedFile,
        metadata: &UploadMetadata,
        duration: Option<f64>,
        listener: Arc<dyn TransferListener>,
    ) -> Result<ContentId, UploadError>;
}
