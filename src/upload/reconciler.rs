//! Progress reconciler
//!
//! The server's processing percent arrives every poll and can jump or even go
//! back. The displayed percent instead climbs by one per tick toward the last
//! reported value, holds when the server value drops below it, and only resets
//! when no session is active.

use super::session::{SessionHandle, UploadStage};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// One reconciler tick
pub fn reconcile(stage: UploadStage, server: u8, visual: u8) -> u8 {
    if stage != UploadStage::Processing && server == 0 {
        return 0;
    }
    if visual < server {
        visual + 1
    } else {
        visual
    }
}

/// Visual progress tracked across ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressReconciler {
    visual: u8,
}

impl ProgressReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visual(&self) -> u8 {
        self.visual
    }

    pub fn tick(&mut self, stage: UploadStage, server: u8) -> u8 {
        self.visual = reconcile(stage, server, self.visual);
        self.visual
    }

    /// Apply `ticks` ticks against a fixed server value
    pub fn advance(&mut self, stage: UploadStage, server: u8, ticks: u32) -> u8 {
        for _ in 0..ticks {
            let before = self.visual;
            if self.tick(stage, server) == before {
                break;
            }
        }
        self.visual
    }
}

/// Tick `visual_progress` on `session` every `tick` until cancelled
pub async fn run(session: SessionHandle, tick: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                session.update_if(|s| {
                    let next = reconcile(s.stage, s.server_progress, s.visual_progress);
                    let changed = next != s.visual_progress;
                    s.visual_progress = next;
                    changed
                });
            }
        }
    }

    tracing::debug!("Progress reconciler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: UploadStage = UploadStage::Processing;

    #[test]
    fn test_climbs_one_step_at_a_time() {
        assert_eq!(reconcile(P, 40, 0), 1);
        assert_eq!(reconcile(P, 40, 39), 40);
        assert_eq!(reconcile(P, 40, 40), 40);
    }

    #[test]
    fn test_holds_when_server_regresses() {
        assert_eq!(reconcile(P, 20, 35), 35);
        assert_eq!(reconcile(P, 0, 35), 35);
    }

    #[test]
    fn test_resets_only_without_active_session() {
        assert_eq!(reconcile(UploadStage::Idle, 0, 57), 0);
        assert_eq!(reconcile(UploadStage::Transferring, 0, 12), 0);
        // completion delay: server forced to 100, keep climbing
        assert_eq!(reconcile(UploadStage::Completed, 100, 57), 58);
    }

    #[test]
    fn test_converges_within_p_ticks() {
        for p in [0u8, 1, 40, 99, 100] {
            let mut r = ProgressReconciler::new();
            for _ in 0..p {
                r.tick(P, p);
            }
            assert_eq!(r.visual(), p, "should reach {} in {} ticks", p, p);
            for _ in 0..50 {
                r.tick(P, p);
            }
            assert_eq!(r.visual(), p, "should stay at {}", p);
        }
    }

    #[test]
    fn test_monotonic_under_choppy_server_signal() {
        // non-monotonic sequence of (server value, ticks until next poll)
        let polls = [
            (40u8, 10u32),
            (25, 30),
            (60, 5),
            (10, 40),
            (90, 100),
            (70, 3),
            (100, 200),
        ];
        let mut r = ProgressReconciler::new();
        let mut max_seen = 0u8;
        let mut last = 0u8;

        for (server, ticks) in polls {
            max_seen = max_seen.max(server);
            for _ in 0..ticks {
                let v = r.tick(P, server);
                assert!(v >= last, "visual regressed from {} to {}", last, v);
                assert!(v <= max_seen, "visual {} exceeded max server {}", v, max_seen);
                last = v;
            }
        }
        assert_eq!(r.visual(), 100);
    }

    #[test]
    fn test_advance_stops_at_target() {
        let mut r = ProgressReconciler::new();
        assert_eq!(r.advance(P, 40, 10), 10);
        assert_eq!(r.advance(P, 40, 1000), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_animates_session() {
        let session = SessionHandle::new();
        session.update(|s| {
            s.stage = UploadStage::Processing;
            s.server_progress = 40;
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            session.clone(),
            Duration::from_millis(50),
            cancel.clone(),
        ));

        // first interval tick fires immediately, then every 50ms
        tokio::time::sleep(Duration::from_millis(50 * 10 + 1)).await;
        let visual = session.snapshot().visual_progress;
        assert!((10..=11).contains(&visual), "visual was {}", visual);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.snapshot().visual_progress, 40);

        cancel.cancel();
        task.await.unwrap();

        session.update(|s| s.server_progress = 90);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.snapshot().visual_progress, 40, "stopped driver must not tick");
    }
}
