//! ============================================================================
//! Step Reconciler - Multi-source step merging
//! ============================================================================
//! Produces one authoritative daily count from untrusted sources:
//! - Sensor / health readings merged with the wearable count (max wins)
//! - Daily ceiling, monotonic within a day
//! - Lifetime and pending totals grow by the applied delta only
//! - Walking-speed gate for manual entries
//! - Milestone haptics/notifications (best effort)
//!
//! Every read-modify-write of the snapshot happens under a std mutex that is
//! never held across an `.await`.
//! ============================================================================

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::db::{load_snapshot, save_snapshot, KeyValueStore};
use crate::platform::{Notifier, SourceSet};
use crate::types::{MilestoneEvent, SpeedSample, StepError, StepSnapshot, StepSource};

/// Pending amount taken by a sync, tagged with the day epoch it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCapture {
    pub amount: u64,
    epoch: u64,
}

struct ReconcilerState {
    snapshot: StepSnapshot,
    /// Bumped on every daily reset so a capture from a previous day can't
    /// eat into the new day's pending steps
    epoch: u64,
}

#[derive(Debug, Clone, Copy)]
enum Reading {
    Absolute(StepSource, u64),
    SensorDelta(u64),
    Manual(u64),
}

#[derive(Debug, Clone, Copy)]
struct Applied {
    old: u64,
    new: u64,
}

/// Owner of the [`StepSnapshot`]
pub struct StepReconciler {
    state: Mutex<ReconcilerState>,
    config: TrackerConfig,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
}

impl StepReconciler {
    /// Create a reconciler, restoring any snapshot found in the store
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mut snapshot = load_snapshot(store.as_ref());
        if snapshot.daily_steps > config.max_daily_steps {
            warn!(
                "Restored daily steps {} above ceiling {}, clamping",
                snapshot.daily_steps, config.max_daily_steps
            );
            snapshot.daily_steps = config.max_daily_steps;
        }
        // Pending steps are a part of today's steps
        if snapshot.pending_steps > snapshot.daily_steps {
            warn!(
                "Restored pending steps {} above daily steps {}, clamping",
                snapshot.pending_steps, snapshot.daily_steps
            );
            snapshot.pending_steps = snapshot.daily_steps;
        }

        info!(
            "Step reconciler ready: daily={} lifetime={} pending={}",
            snapshot.daily_steps, snapshot.lifetime_steps, snapshot.pending_steps
        );

        Self {
            state: Mutex::new(ReconcilerState { snapshot, epoch: 0 }),
            config,
            store,
            notifier,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> StepSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn pending_steps(&self) -> u64 {
        self.lock().snapshot.pending_steps
    }

    // ========================================================================
    // Step Ingestion
    // ========================================================================

    /// Apply a cumulative-since-midnight reading from one source.
    /// Negative counts are rejected and leave the snapshot unchanged.
    pub async fn ingest(&self, source: StepSource, raw_count: i64, at: DateTime<Utc>) -> StepSnapshot {
        if raw_count < 0 {
            warn!(
                "Rejected negative step count {} from {}",
                raw_count,
                source.as_str()
            );
            return self.snapshot();
        }

        self.apply_reading(Reading::Absolute(source, raw_count as u64), at)
            .await
    }

    /// Apply a delta from the background step service
    pub async fn ingest_sensor_delta(&self, delta: u64, at: DateTime<Utc>) -> StepSnapshot {
        self.apply_reading(Reading::SensorDelta(delta), at).await
    }

    /// Manual step entry, refused while moving faster than walking speed
    pub async fn add_manual_steps(
        &self,
        count: i64,
        at: DateTime<Utc>,
    ) -> Result<StepSnapshot, StepError> {
        if count <= 0 {
            return Err(StepError::InvalidStepCount(count));
        }

        {
            let state = self.lock();
            let snap = &state.snapshot;
            if !snap.is_valid_speed && snap.current_speed_kmh > self.config.max_walking_speed_kmh {
                warn!(
                    "Manual steps refused at {:.1} km/h",
                    snap.current_speed_kmh
                );
                return Err(StepError::SpeedViolation {
                    speed_kmh: snap.current_speed_kmh,
                    limit_kmh: self.config.max_walking_speed_kmh,
                });
            }
        }

        Ok(self.apply_reading(Reading::Manual(count as u64), at).await)
    }

    async fn apply_reading(&self, reading: Reading, at: DateTime<Utc>) -> StepSnapshot {
        let (snapshot, milestones) = {
            let mut state = self.lock();
            let snap = &mut state.snapshot;

            if snap.day.is_none() {
                snap.day = Some(at.with_timezone(&Local).date_naive());
            }

            let reconciled = match reading {
                Reading::Absolute(StepSource::ThirdParty, count) => {
                    snap.third_party_steps = count;
                    snap.last_third_party_sync = Some(at);
                    reconciled_count(snap)
                }
                Reading::Absolute(_, count) => {
                    snap.device_steps = count;
                    reconciled_count(snap)
                }
                Reading::SensorDelta(delta) => {
                    snap.device_steps = snap.device_steps.saturating_add(delta);
                    reconciled_count(snap)
                }
                Reading::Manual(count) => snap.daily_steps.saturating_add(count),
            };

            let applied = apply_count(snap, reconciled, self.config.max_daily_steps);
            if applied.new > applied.old {
                debug!(
                    "Daily steps {} -> {} ({:?})",
                    applied.old, applied.new, reading
                );
            }
            self.persist(snap);

            let milestones = milestones_crossed(applied, self.config.milestone_interval, at);
            (snap.clone(), milestones)
        };

        for event in &milestones {
            self.celebrate(event).await;
        }

        snapshot
    }

    /// Haptic + local notification; failures are logged and dropped
    async fn celebrate(&self, event: &MilestoneEvent) {
        info!("Milestone reached: {} steps", event.milestone);

        if let Err(e) = self.notifier.haptic().await {
            warn!("Milestone haptic failed: {}", e);
        }

        let body = format!("You've walked {} steps today. Keep going!", event.milestone);
        if let Err(e) = self.notifier.notify("Milestone reached!", &body).await {
            warn!("Milestone notification failed: {}", e);
        }
    }

    // ========================================================================
    // Speed Gate
    // ========================================================================

    pub fn record_speed_sample(&self, speed_kmh: f64, accuracy_meters: f64) {
        let speed = if speed_kmh.is_finite() && speed_kmh > 0.0 {
            speed_kmh
        } else {
            0.0
        };

        let mut state = self.lock();
        let snap = &mut state.snapshot;
        snap.current_speed_kmh = speed;
        snap.gps_accuracy_meters = if accuracy_meters.is_finite() && accuracy_meters > 0.0 {
            accuracy_meters
        } else {
            0.0
        };
        snap.is_valid_speed = speed <= self.config.max_walking_speed_kmh;

        if !snap.is_valid_speed {
            warn!(
                "Speed {:.1} km/h above walking limit {:.1} km/h",
                speed, self.config.max_walking_speed_kmh
            );
        }
        self.persist(snap);
    }

    // ========================================================================
    // Day Boundaries
    // ========================================================================

    /// Zero the daily counters. Lifetime steps are untouched.
    pub fn reset_daily(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        let snap = &mut state.snapshot;
        snap.daily_steps = 0;
        snap.pending_steps = 0;
        snap.device_steps = 0;
        snap.third_party_steps = 0;
        self.persist(snap);
        info!("Daily step counters reset");
    }

    /// Midnight hook: reset if the snapshot belongs to another day
    pub fn roll_day_if_needed(&self, today: NaiveDate) -> bool {
        let stale = {
            let mut state = self.lock();
            match state.snapshot.day {
                Some(day) if day != today => true,
                Some(_) => false,
                None => {
                    state.snapshot.day = Some(today);
                    self.persist(&state.snapshot);
                    false
                }
            }
        };

        if stale {
            self.reset_daily();
            let mut state = self.lock();
            state.snapshot.day = Some(today);
            self.persist(&state.snapshot);
        }
        stale
    }

    // ========================================================================
    // Wearable Link
    // ========================================================================

    pub fn set_third_party_connected(&self, connected: bool) {
        let mut state = self.lock();
        state.snapshot.third_party_connected = connected;
        self.persist(&state.snapshot);
        info!("Third-party fitness source connected: {}", connected);
    }

    /// Link state as reported by the source itself on poll
    fn mark_third_party_linked(&self, linked: bool) {
        let mut state = self.lock();
        if state.snapshot.third_party_connected != linked {
            state.snapshot.third_party_connected = linked;
            self.persist(&state.snapshot);
            info!("Third-party source reports linked: {}", linked);
        }
    }

    // ========================================================================
    // Sync Bookkeeping
    // ========================================================================

    /// Take the pending amount for a sync attempt
    pub fn capture_pending(&self) -> PendingCapture {
        let state = self.lock();
        PendingCapture {
            amount: state.snapshot.pending_steps,
            epoch: state.epoch,
        }
    }

    /// Subtract a delivered amount. Steps ingested while the sync was in
    /// flight stay pending. Returns what is still pending.
    pub fn apply_synced(&self, capture: PendingCapture, at: DateTime<Utc>) -> u64 {
        let mut state = self.lock();
        let same_day = state.epoch == capture.epoch;
        let snap = &mut state.snapshot;

        if same_day {
            snap.pending_steps = snap.pending_steps.saturating_sub(capture.amount);
        } else {
            debug!("Daily reset during sync, keeping new pending steps");
        }
        snap.last_sync_time = Some(at);
        self.persist(snap);
        snap.pending_steps
    }

    // ========================================================================
    // Source Polling
    // ========================================================================

    /// Read every available source once. A failing source is logged and
    /// skipped; the others are still applied.
    pub async fn poll_sources(&self, sources: &SourceSet) -> StepSnapshot {
        let now = Utc::now();

        if let Some(sensor) = &sources.sensor {
            match sensor.take_steps().await {
                Ok(0) => {}
                Ok(delta) => {
                    self.ingest_sensor_delta(delta, now).await;
                }
                Err(e) => warn!("Sensor source failed: {}", e),
            }
        }

        if let Some(health) = &sources.health {
            match health.steps_today().await {
                Ok(Some(count)) => {
                    self.apply_reading(Reading::Absolute(StepSource::HealthApi, count), now)
                        .await;
                }
                Ok(None) => debug!("Health API has no steps for today"),
                Err(e) => warn!("Health source failed: {}", e),
            }
        }

        if let Some(third_party) = &sources.third_party {
            match third_party.steps_today().await {
                Ok(Some(count)) => {
                    self.mark_third_party_linked(true);
                    self.apply_reading(Reading::Absolute(StepSource::ThirdParty, count), now)
                        .await;
                }
                Ok(None) => {
                    debug!("Third-party source not linked");
                    self.mark_third_party_linked(false);
                }
                Err(e) => warn!("Third-party source failed, using other sources: {}", e),
            }
        }

        if let Some(location) = &sources.location {
            match location.speed_sample().await {
                Ok(Some(SpeedSample {
                    speed_kmh,
                    accuracy_meters,
                })) => self.record_speed_sample(speed_kmh, accuracy_meters),
                Ok(None) => {}
                Err(e) => warn!("Location source failed: {}", e),
            }
        }

        self.snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        // State is plain data; recover it if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, snapshot: &StepSnapshot) {
        if let Err(e) = save_snapshot(self.store.as_ref(), snapshot) {
            warn!("Failed to persist step snapshot: {}", e);
        }
    }
}

/// Higher of the device and wearable counts when the wearable is linked
fn reconciled_count(snap: &StepSnapshot) -> u64 {
    if snap.third_party_connected {
        snap.device_steps.max(snap.third_party_steps)
    } else {
        snap.device_steps
    }
}

fn apply_count(snap: &mut StepSnapshot, reconciled: u64, max_daily: u64) -> Applied {
    let old = snap.daily_steps;
    let target = reconciled.min(max_daily);

    if target > old {
        let delta = target - old;
        snap.daily_steps = target;
        snap.lifetime_steps = snap.lifetime_steps.saturating_add(delta);
        snap.pending_steps = snap.pending_steps.saturating_add(delta);
    }

    Applied {
        old,
        new: snap.daily_steps,
    }
}

/// One event per boundary crossed, lowest first
fn milestones_crossed(applied: Applied, interval: u64, at: DateTime<Utc>) -> Vec<MilestoneEvent> {
    let interval = interval.max(1);
    let first = applied.old / interval + 1;
    let last = applied.new / interval;

    (first..=last)
        .map(|n| MilestoneEvent {
            milestone: n * interval,
            daily_steps: applied.new,
            reached_at: at,
        })
        .collect()
}
