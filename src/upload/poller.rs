//! Processing poller
//!
//! Once a record exists the backend runs moderation on it. The poller asks for
//! the record's status at a fixed interval until the backend reports a
//! terminal status or the session is cancelled. A failed query is logged and
//! the next tick tries again; only a `failed` status ends the loop early.

use super::session::{SessionHandle, UploadStage};
use super::GENERIC_PROCESSING_FAILURE;
use crate::api::{ApiClient, ApiError};
use crate::metrics;
use crate::models::{ContentId, ContentKind, ProcessingStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// One status observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingReport {
    pub status: ProcessingStatus,
    pub progress: u8,
    pub error: Option<String>,
}

/// Where processing status comes from
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(
        &self,
        kind: ContentKind,
        id: &ContentId,
    ) -> Result<ProcessingReport, ApiError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(
        &self,
        kind: ContentKind,
        id: &ContentId,
    ) -> Result<ProcessingReport, ApiError> {
        let record = self.get_record(kind, id).await?;
        Ok(ProcessingReport {
            status: record.processing_status,
            progress: record.progress_percent(),
            error: record.processing_error,
        })
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

pub struct ProcessingPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
}

impl ProcessingPoller {
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until terminal status or cancellation, writing results into `session`.
    ///
    /// The first query goes out one interval after the call.
    #[tracing::instrument(
        name = "upload.poll",
        skip(self, session, cancel),
        fields(content.kind = %kind, content.id = %id)
    )]
    pub async fn run(
        &self,
        kind: ContentKind,
        id: &ContentId,
        session: &SessionHandle,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                result = self.source.fetch_status(kind, id) => result,
            };

            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    metrics::record_poll(kind.as_str(), "transient_error");
                    metrics::record_error("poll_transient_error");
                    tracing::warn!(error = %e, "Status query failed; retrying on next tick");
                    continue;
                }
            };

            let progress = report.progress.min(100);
            match report.status {
                ProcessingStatus::Completed => {
                    metrics::record_poll(kind.as_str(), "completed");
                    session.update(|s| {
                        s.server_progress = 100;
                        s.stage = UploadStage::Completed;
                    });
                    tracing::info!("Processing completed");
                    return PollOutcome::Completed;
                }
                ProcessingStatus::Failed => {
                    metrics::record_poll(kind.as_str(), "failed");
                    let message = report
                        .error
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| GENERIC_PROCESSING_FAILURE.to_string());
                    session.update(|s| {
                        s.server_progress = progress;
                        s.fail(message.clone());
                    });
                    tracing::warn!(error = %message, "Processing failed");
                    return PollOutcome::Failed(message);
                }
                _ => {
                    metrics::record_poll(kind.as_str(), "pending");
                    session.update_if(|s| {
                        let changed = s.server_progress != progress;
                        s.server_progress = progress;
                        changed
                    });
                    tracing::debug!(progress, status = ?report.status, "Processing in progress");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted answers; keeps answering pending once the script runs out
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<ProcessingReport, ApiError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<ProcessingReport, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(
            &self,
            _kind: ContentKind,
            _id: &ContentId,
        ) -> Result<ProcessingReport, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(report(ProcessingStatus::Pending, 0)))
        }
    }

    fn report(status: ProcessingStatus, progress: u8) -> ProcessingReport {
        ProcessingReport {
            status,
            progress,
            error: None,
        }
    }

    fn transient() -> Result<ProcessingReport, ApiError> {
        Err(ApiError::Status {
            status: 503,
            message: "Service Unavailable".into(),
        })
    }

    fn processing_session() -> SessionHandle {
        let session = SessionHandle::new();
        session.update(|s| s.enter_processing(ContentId::new("abc123")));
        session
    }

    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_stops_polling_after_completed() {
        let source = ScriptedSource::new(vec![
            Ok(report(ProcessingStatus::Pending, 40)),
            Ok(report(ProcessingStatus::Completed, 100)),
        ]);
        let poller = ProcessingPoller::new(source.clone(), INTERVAL);
        let session = processing_session();
        let cancel = CancellationToken::new();

        let outcome = poller
            .run(ContentKind::Video, &ContentId::new("abc123"), &session, &cancel)
            .await;

        assert_eq!(outcome, PollOutcome::Completed);
        assert_eq!(source.calls(), 2);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.stage, UploadStage::Completed);
        assert_eq!(snapshot.server_progress, 100);

        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(source.calls(), 2, "no query after a terminal status");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_ends_loop_with_message() {
        let source = ScriptedSource::new(vec![
            Ok(report(ProcessingStatus::Pending, 10)),
            Ok(ProcessingReport {
                status: ProcessingStatus::Failed,
                progress: 30,
                error: Some("Moderation service rejected the file".into()),
            }),
        ]);
        let poller = ProcessingPoller::new(source.clone(), INTERVAL);
        let session = processing_session();

        let outcome = poller
            .run(
                ContentKind::Video,
                &ContentId::new("abc123"),
                &session,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Failed("Moderation service rejected the file".into())
        );
        let snapshot = session.snapshot();
        assert_eq!(snapshot.stage, UploadStage::Failed);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("Moderation service rejected the file")
        );

        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_without_detail_uses_generic_message() {
        let source = ScriptedSource::new(vec![Ok(report(ProcessingStatus::Failed, 0))]);
        let poller = ProcessingPoller::new(source, INTERVAL);
        let session = processing_session();

        let outcome = poller
            .run(
                ContentKind::Photo,
                &ContentId::new("p1"),
                &session,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, PollOutcome::Failed("Processing failed".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_does_not_end_loop() {
        let source = ScriptedSource::new(vec![
            Ok(report(ProcessingStatus::Pending, 20)),
            transient(),
            Ok(report(ProcessingStatus::Pending, 60)),
        ]);
        let poller = Arc::new(ProcessingPoller::new(source.clone(), INTERVAL));
        let session = processing_session();
        let cancel = CancellationToken::new();

        let task = {
            let (poller, session, cancel) = (poller.clone(), session.clone(), cancel.clone());
            tokio::spawn(async move {
                poller
                    .run(ContentKind::Video, &ContentId::new("abc123"), &session, &cancel)
                    .await
            })
        };

        // after the transient failure (second tick) we are still processing
        tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 2);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.stage, UploadStage::Processing);
        assert_eq!(snapshot.server_progress, 20);
        assert!(snapshot.error_message.is_none());

        // and the next tick polls again
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(session.snapshot().server_progress, 60);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_monotonic_server_progress_taken_as_is() {
        let source = ScriptedSource::new(vec![
            Ok(report(ProcessingStatus::Processing, 70)),
            Ok(report(ProcessingStatus::Processing, 45)),
            Ok(report(ProcessingStatus::Completed, 100)),
        ]);
        let poller = ProcessingPoller::new(source, INTERVAL);
        let session = processing_session();
        let mut rx = session.subscribe();

        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let progress = rx.borrow_and_update().server_progress;
                if seen.last() != Some(&progress) {
                    seen.push(progress);
                }
                if progress == 100 {
                    break;
                }
            }
            seen
        });

        poller
            .run(
                ContentKind::Video,
                &ContentId::new("abc123"),
                &session,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(observer.await.unwrap(), vec![70, 45, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_queries() {
        let source = ScriptedSource::new(vec![]);
        let poller = Arc::new(ProcessingPoller::new(source.clone(), INTERVAL));
        let session = processing_session();
        let cancel = CancellationToken::new();

        let task = {
            let (poller, session, cancel) = (poller.clone(), session.clone(), cancel.clone());
            tokio::spawn(async move {
                poller
                    .run(ContentKind::Video, &ContentId::new("abc123"), &session, &cancel)
                    .await
            })
        };

        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 3);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), PollOutcome::Cancelled);

        tokio::time::sleep(INTERVAL * 10).await;
        assert_eq!(source.calls(), 3, "no query after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_query_waits_one_interval() {
        let source = ScriptedSource::new(vec![]);
        let poller = Arc::new(ProcessingPoller::new(source.clone(), INTERVAL));
        let session = processing_session();
        let cancel = CancellationToken::new();

        let task = {
            let (poller, session, cancel) = (poller.clone(), session.clone(), cancel.clone());
            tokio::spawn(async move {
                poller
                    .run(ContentKind::Video, &ContentId::new("abc123"), &session, &cancel)
                    .await
            })
        };

        tokio::time::sleep(INTERVAL - Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.calls(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
