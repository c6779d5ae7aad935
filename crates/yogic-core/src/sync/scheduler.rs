//! ============================================================================
//! Sync Scheduler - Single-flight pending step flush
//! ============================================================================
//! - Captures pending steps, calls the balance mutation, then subtracts only
//!   the captured amount so steps walked during the call survive
//! - Overlapping flushes coalesce instead of sending twice
//! - Results arriving after teardown are dropped without touching state
//! - Failures keep pending steps for the next tick / foreground
//! ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::balance::BalanceMutation;
use super::session::SessionHandle;
use super::SyncError;
use crate::reconciler::StepReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotTracking,
    NoSession,
    NothingPending,
}

/// Result of a flush that did not fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped { reason: SkipReason },
    /// Another flush was already running
    InFlight,
    Synced {
        steps: u64,
        coins_earned: Option<u64>,
        /// Pending steps left after the subtraction
        remaining: u64,
    },
    /// The call finished after tracking stopped
    Discarded,
}

struct SchedulerInner {
    reconciler: Arc<StepReconciler>,
    balance: Arc<dyn BalanceMutation>,
    session: SessionHandle,
    in_flight: AtomicBool,
    tracking: AtomicBool,
}

/// Released on drop so an early return or error can't wedge the scheduler
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(
        reconciler: Arc<StepReconciler>,
        balance: Arc<dyn BalanceMutation>,
        session: SessionHandle,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                reconciler,
                balance,
                session,
                in_flight: AtomicBool::new(false),
                tracking: AtomicBool::new(true),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Flush pending steps once
    pub async fn flush(&self) -> Result<SyncOutcome, SyncError> {
        self.inner.flush().await
    }

    /// App came back to the foreground
    pub async fn on_app_foreground(&self) -> Result<SyncOutcome, SyncError> {
        debug!("Foreground transition, flushing pending steps");
        self.inner.flush().await
    }

    /// Start the repeating flush timer. Only runs for signed-in, non-guest
    /// users; returns false when there is no such session. Ticks while
    /// signed out are skipped and syncing resumes after the next sign-in.
    /// Replaces any timer already running.
    pub fn schedule_auto_sync(&self, interval: Duration) -> bool {
        if self.inner.session.authenticated().is_none() {
            debug!("No authenticated session, auto sync not scheduled");
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !inner.tracking.load(Ordering::Acquire) {
                    break;
                }
                if inner.session.authenticated().is_none() {
                    debug!("No authenticated session, skipping sync tick");
                    continue;
                }
                if let Err(e) = inner.flush().await {
                    warn!("Scheduled sync failed, will retry next tick: {}", e);
                }
            }
        });

        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }

        info!("Auto sync scheduled every {:?}", interval);
        true
    }

    /// Resume after a previous [`SyncScheduler::stop`]
    pub fn resume(&self) {
        self.inner.tracking.store(true, Ordering::Release);
    }

    /// Cancel the timer and mark tracking as ended. In-flight calls are
    /// allowed to finish but their results are discarded.
    pub fn stop(&self) {
        self.inner.tracking.store(false, Ordering::Release);
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
            info!("Auto sync cancelled");
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.load(Ordering::Acquire)
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

impl SchedulerInner {
    async fn flush(&self) -> Result<SyncOutcome, SyncError> {
        if !self.tracking.load(Ordering::Acquire) {
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::NotTracking,
            });
        }

        let Some(session) = self.session.authenticated() else {
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::NoSession,
            });
        };

        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            debug!("Sync already in flight, coalescing");
            return Ok(SyncOutcome::InFlight);
        };

        let capture = self.reconciler.capture_pending();
        if capture.amount == 0 {
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::NothingPending,
            });
        }

        info!("Syncing {} pending steps for {}", capture.amount, session.user_id);
        let result = self.balance.earn_steps(&session, capture.amount).await;

        if !self.tracking.load(Ordering::Acquire) {
            warn!(
                "Tracking stopped during sync, discarding result; {} steps stay pending \
                 and may be credited again if the server accepted them",
                capture.amount
            );
            return Ok(SyncOutcome::Discarded);
        }

        match result {
            Ok(response) if response.success => {
                let remaining = self.reconciler.apply_synced(capture, Utc::now());
                info!(
                    "Synced {} steps (coins: {:?}, still pending: {})",
                    capture.amount, response.coins_earned, remaining
                );
                Ok(SyncOutcome::Synced {
                    steps: capture.amount,
                    coins_earned: response.coins_earned,
                    remaining,
                })
            }
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "success flag missing".to_string());
                warn!("Sync rejected, keeping {} pending steps: {}", capture.amount, reason);
                Err(SyncError::Rejected(reason))
            }
            Err(e) => {
                warn!("Sync failed, keeping {} pending steps: {}", capture.amount, e);
                Err(e)
            }
        }
    }
}
