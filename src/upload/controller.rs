//! Upload lifecycle controller
//!
//! Owns one [`SessionHandle`] and runs the stage sequence
//! `idle → transferring → (saving) → processing → completed | failed`.
//! The active transfer path is a [`TransferStrategy`]; the controller does not
//! know which one it holds.
//!
//! Every task started for a submit hangs off one `CancellationToken`:
//! [`UploadController::cancel`], dropping the controller, or dropping the
//! `submit` future stops the transfer, the poller and the reconciler together.
//!
//! # Example
//!
//! ```no_run
//! use kanshi_uploadr::api::ApiClient;
//! use kanshi_uploadr::config::Config;
//! use kanshi_uploadr::models::{ContentId, ContentKind};
//! use kanshi_uploadr::storage::StorageClient;
//! use kanshi_uploadr::upload::{DirectTransfer, SelectedFile, UploadController, UploadMetadata};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let api = Arc::new(ApiClient::new(&config.backend)?);
//! let strategy = Arc::new(DirectTransfer::new(api.clone(), StorageClient::new(&config.storage)?));
//!
//! let controller = UploadController::new(ContentKind::Video, &config.upload, strategy, api)
//!     .on_complete(Arc::new(|id: &ContentId| println!("done: {}", id)));
//!
//! controller.select_file(SelectedFile::from_path(Path::new("clip.mp4"), None).await?)?;
//! controller.set_metadata(UploadMetadata::new("My clip", ""));
//! controller.submit().await?;
//! # Ok(())
//! # }
//! ```

use super::intake::{DurationProbe, SelectedFile, UploadIntake};
use super::poller::{PollOutcome, ProcessingPoller, StatusSource};
use super::reconciler;
use super::session::{SessionHandle, UploadStage};
use super::transfer::transfer_percent;
use super::{TransferListener, TransferStrategy, UploadError, UploadMetadata};
use crate::config::UploadConfig;
use crate::metrics;
use crate::models::{ContentId, ContentKind};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Called once processing completes, after the completion delay
pub type CompletionHook = Arc<dyn Fn(&ContentId) + Send + Sync>;

/// How a submit ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed(ContentId),
    Cancelled,
}

/// Writes transfer events into the session
struct SessionListener {
    session: SessionHandle,
}

impl TransferListener for SessionListener {
    fn bytes_sent(&self, sent: u64, total: u64) {
        let percent = transfer_percent(sent, total);
        self.session.update_if(|s| {
            s.stage == UploadStage::Transferring && s.record_transfer_progress(percent)
        });
    }

    fn storage_complete(&self) {
        self.session.update(|s| {
            s.record_transfer_progress(100);
            s.stage = UploadStage::Saving;
        });
    }
}

pub struct UploadController {
    kind: ContentKind,
    intake: UploadIntake,
    strategy: Arc<dyn TransferStrategy>,
    poller: ProcessingPoller,
    probe: Option<Arc<dyn DurationProbe>>,
    probe_timeout: Duration,
    reconcile_tick: Duration,
    completion_delay: Duration,
    session: SessionHandle,
    cancel: Mutex<CancellationToken>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
    on_complete: Option<CompletionHook>,
}

impl UploadController {
    pub fn new(
        kind: ContentKind,
        config: &UploadConfig,
        strategy: Arc<dyn TransferStrategy>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            kind,
            intake: UploadIntake::new(config, strategy.kind()),
            strategy,
            poller: ProcessingPoller::new(status, config.poll_interval()),
            probe: None,
            probe_timeout: config.duration_probe_timeout(),
            reconcile_tick: config.reconcile_tick(),
            completion_delay: config.completion_delay(),
            session: SessionHandle::new(),
            cancel: Mutex::new(CancellationToken::new()),
            probe_task: Mutex::new(None),
            on_complete: None,
        }
    }

    /// Extract video durations with `probe` when a file is selected
    pub fn with_duration_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn intake(&self) -> &UploadIntake {
        &self.intake
    }

    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Validate and remember `file`.
    ///
    /// On rejection the error is also written to the session and any earlier
    /// accepted file stays selected. For videos a duration probe starts in the
    /// background when a probe is configured and a runtime is available.
    pub fn select_file(&self, file: SelectedFile) -> Result<(), UploadError> {
        if self.session.stage().is_active() {
            return Err(UploadError::AlreadyInProgress);
        }

        self.session.update(|s| s.stage = UploadStage::Validating);

        if let Err(e) = self.intake.validate(self.kind, &file) {
            metrics::record_error(e.kind().as_str());
            tracing::info!(file = %file.name, mime = %file.mime_type, error = %e, "File rejected");
            let message = e.to_string();
            self.session.update(|s| {
                s.stage = UploadStage::Idle;
                s.error_message = Some(message);
            });
            return Err(e);
        }

        if let Some(task) = self.probe_task.lock().take() {
            task.abort();
        }

        self.session.update(|s| {
            s.selected_file = Some(file.clone());
            s.derived_duration = None;
            s.error_message = None;
            s.stage = UploadStage::Idle;
        });

        if self.kind == ContentKind::Video {
            self.spawn_duration_probe(&file);
        }

        Ok(())
    }

    fn spawn_duration_probe(&self, file: &SelectedFile) {
        let Some(probe) = self.probe.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime; skipping duration probe");
            return;
        };

        let session = self.session.clone();
        let path = file.path.clone();
        let timeout = self.probe_timeout;

        let task = runtime.spawn(async move {
            match tokio::time::timeout(timeout, probe.probe(&path)).await {
                Ok(Some(seconds)) => {
                    // only if the same file is still selected
                    session.update_if(|s| {
                        let current = s.selected_file.as_ref().map(|f| &f.path) == Some(&path);
                        if current {
                            s.derived_duration = Some(seconds);
                        }
                        current
                    });
                    tracing::debug!(seconds, "Video duration extracted");
                }
                Ok(None) => tracing::debug!("Video duration unavailable"),
                Err(_) => tracing::warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Duration probe timed out; continuing without duration"
                ),
            }
        });

        *self.probe_task.lock() = Some(task);
    }

    pub fn set_metadata(&self, metadata: UploadMetadata) {
        self.session.update(|s| s.metadata = metadata);
    }

    /// Run transfer, processing and completion for the selected file
    #[tracing::instrument(
        name = "upload.submit",
        skip(self),
        fields(
            content.kind = %self.kind,
            upload.strategy = self.strategy.kind().as_str(),
            upload.session = %uuid::Uuid::new_v4()
        )
    )]
    pub async fn submit(&self) -> Result<UploadOutcome, UploadError> {
        // cancel() rotates the token, so this one belongs to the attempt starting here
        let cancel = self.cancel.lock().clone();

        let snapshot = self.session.snapshot();
        if snapshot.stage.is_active() {
            return Err(UploadError::AlreadyInProgress);
        }
        let Some(file) = snapshot.selected_file else {
            return Err(self.reject(UploadError::NoFileSelected(self.kind)));
        };
        if snapshot.metadata.title.trim().is_empty() {
            return Err(self.reject(UploadError::MissingTitle));
        }
        let metadata = snapshot.metadata;

        // bounded by probe_timeout
        let probe_task = self.probe_task.lock().take();
        if let Some(task) = probe_task {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        }

        let mut duration = None;
        let mut busy = false;
        let started = self.session.update_if(|s| {
            // a cancel in between clears the selection
            if cancel.is_cancelled() || s.selected_file.as_ref() != Some(&file) {
                return false;
            }
            if s.stage.is_active() {
                busy = true;
                return false;
            }
            duration = s.derived_duration;
            s.begin_transfer();
            true
        });
        if !started {
            if busy {
                return Err(UploadError::AlreadyInProgress);
            }
            tracing::info!("Cancelled before the transfer started");
            metrics::record_upload_cancelled(self.kind.as_str());
            return Ok(UploadOutcome::Cancelled);
        }

        let mut guard = AbandonGuard {
            controller: self,
            token: cancel.clone(),
            armed: true,
        };

        tracing::info!(
            file = %file.name,
            bytes = file.byte_size,
            duration = ?duration,
            "Starting upload"
        );

        let listener: Arc<dyn TransferListener> = Arc::new(SessionListener {
            session: self.session.clone(),
        });
        let transfer_started = Instant::now();
        let transferred = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.strategy.transfer(self.kind, &file, &metadata, duration, listener) => Some(result),
        };

        let content_id = match transferred {
            None => {
                guard.armed = false;
                return Ok(self.finish_cancelled());
            }
            Some(Err(e)) => {
                guard.armed = false;
                return Err(self.finish_failed(e));
            }
            Some(Ok(id)) => id,
        };

        metrics::record_transfer_duration(
            self.kind.as_str(),
            self.strategy.kind().as_str(),
            transfer_started.elapsed().as_secs_f64(),
        );
        self.session
            .update(|s| s.enter_processing(content_id.clone()));
        tracing::info!(content_id = %content_id, "Transfer complete; waiting for processing");

        let reconcile_cancel = cancel.child_token();
        let reconciler = tokio::spawn(reconciler::run(
            self.session.clone(),
            self.reconcile_tick,
            reconcile_cancel.clone(),
        ));

        let outcome = match self
            .poller
            .run(self.kind, &content_id, &self.session, &cancel)
            .await
        {
            PollOutcome::Completed => {
                let settled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    _ = self.settle() => true,
                };
                if settled {
                    PollOutcome::Completed
                } else {
                    PollOutcome::Cancelled
                }
            }
            other => other,
        };

        reconcile_cancel.cancel();
        let _ = reconciler.await;
        guard.armed = false;

        match outcome {
            PollOutcome::Completed => {
                metrics::record_upload_success(self.kind.as_str(), file.byte_size);
                tracing::info!(content_id = %content_id, "Upload processed");
                if let Some(hook) = &self.on_complete {
                    hook(&content_id);
                }
                Ok(UploadOutcome::Completed(content_id))
            }
            PollOutcome::Failed(message) => {
                // the poller already moved the session to failed
                metrics::record_upload_failure(self.kind.as_str());
                metrics::record_error(super::ErrorKind::ProcessingFailed.as_str());
                Err(UploadError::ProcessingFailed(message))
            }
            PollOutcome::Cancelled => Ok(self.finish_cancelled()),
        }
    }

    /// Completion delay, then let the display catch up to 100
    async fn settle(&self) {
        tokio::time::sleep(self.completion_delay).await;
        let mut rx = self.session.subscribe();
        let _ = rx.wait_for(|s| s.visual_progress >= 100).await;
    }

    /// Stop everything started for this session and clear it
    pub fn cancel(&self) {
        let token = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        token.cancel();
        if let Some(task) = self.probe_task.lock().take() {
            task.abort();
        }
        self.session.reset();
        tracing::info!("Upload cancelled");
    }

    /// After a failure: back to idle, keeping file and metadata for a retry
    pub fn reset(&self) {
        self.session.update_if(|s| {
            if s.stage.is_active() {
                return false;
            }
            s.clear_progress();
            true
        });
    }

    fn reject(&self, err: UploadError) -> UploadError {
        let message = err.to_string();
        self.session.update(|s| s.error_message = Some(message));
        err
    }

    fn finish_failed(&self, err: UploadError) -> UploadError {
        let message = err.to_string();
        self.session.update(|s| s.fail(message));
        metrics::record_upload_failure(self.kind.as_str());
        metrics::record_error(err.kind().as_str());
        tracing::error!(error = %err, "Upload failed");
        err
    }

    fn finish_cancelled(&self) -> UploadOutcome {
        self.session.reset();
        metrics::record_upload_cancelled(self.kind.as_str());
        UploadOutcome::Cancelled
    }
}

/// Held by a running submit; dropping the submit future early cancels its
/// tasks and clears the session
struct AbandonGuard<'a> {
    controller: &'a UploadController,
    token: CancellationToken,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut current = self.controller.cancel.lock();
            // already handled by cancel()
            if self.token.is_cancelled() {
                return;
            }
            self.token.cancel();
            *current = CancellationToken::new();
        }
        tracing::info!("Submit abandoned; stopping upload tasks");
        self.controller.finish_cancelled();
    }
}

impl Drop for UploadController {
    fn drop(&mut self) {
        self.cancel.get_mut().cancel();
        if let Some(task) = self.probe_task.get_mut().take() {
            task.abort();
        }
    }
}
