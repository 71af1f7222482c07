//! In-memory state of one upload
//!
//! The session lives in a `tokio::sync::watch` channel. The transfer listener,
//! the poller and the reconciler each write their own fields through
//! [`SessionHandle::update`]; observers (a progress display, tests) subscribe
//! and read snapshots.

use super::intake::SelectedFile;
use super::UploadMetadata;
use crate::models::ContentId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadStage {
    #[default]
    Idle,
    Validating,
    Transferring,
    Saving,
    Processing,
    Completed,
    Failed,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Idle => "idle",
            UploadStage::Validating => "validating",
            UploadStage::Transferring => "transferring",
            UploadStage::Saving => "saving",
            UploadStage::Processing => "processing",
            UploadStage::Completed => "completed",
            UploadStage::Failed => "failed",
        }
    }

    /// A submit is running between these stages
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            UploadStage::Transferring | UploadStage::Saving | UploadStage::Processing
        )
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    pub selected_file: Option<SelectedFile>,
    pub metadata: UploadMetadata,
    pub derived_duration: Option<f64>,
    pub transfer_progress: u8,
    pub content_id: Option<ContentId>,
    pub server_progress: u8,
    pub visual_progress: u8,
    pub stage: UploadStage,
    pub error_message: Option<String>,
}

impl UploadSession {
    /// Clear progress and errors, keeping the selected file and metadata
    pub fn clear_progress(&mut self) {
        self.transfer_progress = 0;
        self.content_id = None;
        self.server_progress = 0;
        self.visual_progress = 0;
        self.stage = UploadStage::Idle;
        self.error_message = None;
    }

    pub fn begin_transfer(&mut self) {
        self.clear_progress();
        self.stage = UploadStage::Transferring;
    }

    /// Returns whether the value changed; progress never moves backwards
    pub fn record_transfer_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if percent > self.transfer_progress {
            self.transfer_progress = percent;
            true
        } else {
            false
        }
    }

    pub fn enter_processing(&mut self, content_id: ContentId) {
        self.stage = UploadStage::Processing;
        self.content_id = Some(content_id);
        self.server_progress = 0;
        self.visual_progress = 0;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.stage = UploadStage::Failed;
        self.error_message = Some(message.into());
    }
}

/// Shared handle to one session
#[derive(Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<UploadSession>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionHandle")
            .field(&*self.tx.borrow())
            .finish()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(UploadSession::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> UploadSession {
        self.tx.borrow().clone()
    }

    pub fn stage(&self) -> UploadStage {
        self.tx.borrow().stage
    }

    /// Mutate in place and notify subscribers
    pub fn update<F: FnOnce(&mut UploadSession)>(&self, f: F) {
        self.tx.send_modify(f);
    }

    /// Mutate in place; subscribers are notified only when `f` returns true
    pub fn update_if<F: FnOnce(&mut UploadSession) -> bool>(&self, f: F) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Drop everything, including the selected file
    pub fn reset(&self) {
        self.tx.send_replace(UploadSession::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSession> {
        self.tx.subscribe()
    }
}
