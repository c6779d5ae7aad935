//! ============================================================================
//! Step Tracker - Lifecycle wiring for a tracking session
//! ============================================================================
//! Owns the source poll loop and the sync scheduler for one app session:
//! - `start`: poll sources on an interval, roll the day at local midnight,
//!   schedule auto sync for signed-in users
//! - `on_app_foreground`: poll once, then flush
//! - `cleanup`: stop polling and cancel sync; late results are discarded
//! ============================================================================

use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::platform::SourceSet;
use crate::reconciler::StepReconciler;
use crate::sync::{SessionHandle, SyncError, SyncOutcome, SyncScheduler};
use crate::types::StepSnapshot;

pub struct StepTracker {
    reconciler: Arc<StepReconciler>,
    scheduler: SyncScheduler,
    sources: SourceSet,
    session: SessionHandle,
    config: TrackerConfig,
    watch: Mutex<Option<JoinHandle<()>>>,
}

impl StepTracker {
    pub fn new(
        reconciler: Arc<StepReconciler>,
        scheduler: SyncScheduler,
        sources: SourceSet,
        session: SessionHandle,
    ) -> Self {
        let config = reconciler.config().clone();
        Self {
            reconciler,
            scheduler,
            sources,
            session,
            config,
            watch: Mutex::new(None),
        }
    }

    /// Begin watching sources. Returns whether auto sync was scheduled.
    pub fn start(&self) -> bool {
        self.scheduler.resume();
        self.reconciler.roll_day_if_needed(Local::now().date_naive());

        let reconciler = Arc::clone(&self.reconciler);
        let sources = self.sources.clone();
        let interval = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if reconciler.roll_day_if_needed(Local::now().date_naive()) {
                    info!("New day, daily steps reset");
                }
                let snapshot = reconciler.poll_sources(&sources).await;
                debug!(
                    "Poll: daily={} pending={}",
                    snapshot.daily_steps, snapshot.pending_steps
                );
            }
        });

        if let Some(previous) = self.lock_watch().replace(handle) {
            previous.abort();
        }

        info!("Step tracking started (poll every {:?})", interval);
        self.scheduler.schedule_auto_sync(self.config.sync_interval)
    }

    /// Poll once and flush
    pub async fn on_app_foreground(&self) -> Result<SyncOutcome, SyncError> {
        self.reconciler.roll_day_if_needed(Local::now().date_naive());
        self.reconciler.poll_sources(&self.sources).await;
        self.scheduler.on_app_foreground().await
    }

    /// Stop polling and syncing
    pub fn cleanup(&self) {
        if let Some(handle) = self.lock_watch().take() {
            handle.abort();
        }
        self.scheduler.stop();
        info!("Step tracking stopped");
    }

    pub fn is_watching(&self) -> bool {
        self.lock_watch().as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn snapshot(&self) -> StepSnapshot {
        self.reconciler.snapshot()
    }

    pub fn reconciler(&self) -> &Arc<StepReconciler> {
        &self.reconciler
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn lock_watch(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watch.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for StepTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_watch().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::platform::{CapabilityError, NoopNotifier, SensorSource};
    use crate::sync::{BalanceMutation, EarnStepsResponse, SkipReason, UserSession};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Reports a fixed delta on every poll
    struct SteadySensor {
        per_poll: u64,
        polls: AtomicU64,
    }

    #[async_trait]
    impl SensorSource for SteadySensor {
        async fn take_steps(&self) -> Result<u64, CapabilityError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.per_poll)
        }
    }

    #[derive(Default)]
    struct CountingBalance {
        synced: AtomicU64,
    }

    #[async_trait]
    impl BalanceMutation for CountingBalance {
        async fn earn_steps(
            &self,
            _session: &UserSession,
            steps: u64,
        ) -> Result<EarnStepsResponse, SyncError> {
            self.synced.fetch_add(steps, Ordering::SeqCst);
            Ok(EarnStepsResponse {
                success: true,
                coins_earned: Some(steps / 25),
                error: None,
            })
        }
    }

    fn tracker(
        sensor: Arc<SteadySensor>,
        balance: Arc<CountingBalance>,
        session: SessionHandle,
    ) -> StepTracker {
        let config = TrackerConfig {
            poll_interval: Duration::from_millis(20),
            sync_interval: Duration::from_millis(50),
            ..TrackerConfig::default()
        };
        let reconciler = Arc::new(StepReconciler::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NoopNotifier),
        ));
        let scheduler = SyncScheduler::new(Arc::clone(&reconciler), balance, session.clone());
        let sources = SourceSet {
            sensor: Some(sensor),
            ..SourceSet::default()
        };
        StepTracker::new(reconciler, scheduler, sources, session)
    }

    fn sensor(per_poll: u64) -> Arc<SteadySensor> {
        Arc::new(SteadySensor {
            per_poll,
            polls: AtomicU64::new(0),
        })
    }

    #[tokio::test]
    async fn test_guest_polls_but_never_syncs() {
        let session = SessionHandle::new();
        session.sign_in(UserSession::guest());
        let sensor = sensor(10);
        let balance = Arc::new(CountingBalance::default());
        let tracker = tracker(sensor.clone(), balance.clone(), session);

        assert!(!tracker.start());
        assert!(tracker.is_watching());
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(sensor.polls.load(Ordering::SeqCst) >= 2);
        assert!(tracker.snapshot().daily_steps >= 20);
        assert_eq!(balance.synced.load(Ordering::SeqCst), 0);
        tracker.cleanup();
    }

    #[tokio::test]
    async fn test_signed_in_user_syncs_on_timer() {
        let session = SessionHandle::new();
        session.sign_in(UserSession::new("user-1", Some("token".into())));
        let balance = Arc::new(CountingBalance::default());
        let tracker = tracker(sensor(10), balance.clone(), session);

        assert!(tracker.start());
        tokio::time::sleep(Duration::from_millis(250)).await;
        tracker.cleanup();

        let snap = tracker.snapshot();
        let synced = balance.synced.load(Ordering::SeqCst);
        assert!(synced > 0);
        // Everything walked is either synced or still pending
        assert_eq!(synced + snap.pending_steps, snap.lifetime_steps);
    }

    #[tokio::test]
    async fn test_cleanup_stops_polling() {
        let session = SessionHandle::new();
        let sensor = sensor(5);
        let tracker = tracker(sensor.clone(), Arc::new(CountingBalance::default()), session);

        tracker.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        tracker.cleanup();
        // Let the abort land
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!tracker.is_watching());
        assert!(!tracker.scheduler().is_tracking());
        let polls = sensor.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sensor.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test]
    async fn test_foreground_polls_then_flushes() {
        let session = SessionHandle::new();
        session.sign_in(UserSession::new("user-2", None));
        let balance = Arc::new(CountingBalance::default());
        let tracker = tracker(sensor(40), balance.clone(), session.clone());

        let outcome = tracker.on_app_foreground().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                steps: 40,
                coins_earned: Some(1),
                remaining: 0,
            }
        );
        assert_eq!(balance.synced.load(Ordering::SeqCst), 40);

        session.sign_out();
        let outcome = tracker.on_app_foreground().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Skipped {
                reason: SkipReason::NoSession
            }
        );
        assert_eq!(tracker.snapshot().pending_steps, 40);
    }
}
