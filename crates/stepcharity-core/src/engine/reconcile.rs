//! Baseline reconciliation.
//!
//! Platform step sensors report a cumulative count over an arbitrary epoch.
//! The engine captures a per-day baseline and reports
//! `max(0, cumulative_since_midnight - baseline)` as today's steps.
//!
//! ## State transitions
//!
//! ```text
//! uninitialized --first query of day D--> baseline(D) = cumulative_now
//! baseline(D)   --cumulative < baseline--> baseline(D) = 0   (sensor reset)
//! baseline(D)   --first query on D+1-----> baseline(D+1) = cumulative_now
//! ```
//!
//! Sensor and store faults never escape: they are logged and replaced with
//! 0 steps / baseline 0.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::baseline::{BaselineRecord, BaselineStore};
use crate::calendar::{day_key, local_midnight, Clock};
use crate::error::StoreError;
use crate::sensor::{CapabilityGate, PermissionStatus, SensorKind, StepSensor};

/// In-memory mirror of the durable baseline.
#[derive(Debug, Clone, Copy, Default)]
struct BaselineState {
    current_baseline: u64,
    baseline_date: Option<NaiveDate>,
}

impl BaselineState {
    fn record(&self) -> Option<BaselineRecord> {
        self.baseline_date
            .map(|date| BaselineRecord::new(self.current_baseline, date))
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodaySnapshot {
    pub date: NaiveDate,
    pub steps: u64,
    /// Raw midnight-to-now reading; `None` if the sensor query failed.
    pub cumulative: Option<u64>,
    pub baseline: u64,
    pub reset_detected: bool,
}

/// Debug view of the sensor and baseline, computed without touching state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDiagnostics {
    pub sensor_kind: SensorKind,
    pub available: bool,
    pub permission: PermissionStatus,
    pub stored_baseline: Option<BaselineRecord>,
    pub today: String,
    pub raw_steps: Option<u64>,
    pub computed_steps: Option<u64>,
}

/// Step reconciliation engine. One instance per process.
pub struct StepEngine {
    sensor: Arc<dyn StepSensor>,
    store: Arc<dyn BaselineStore>,
    clock: Arc<dyn Clock>,
    /// Held across a whole pass: this is what serializes initialization,
    /// so a caller arriving mid-init waits and then sees the fresh baseline.
    state: Mutex<BaselineState>,
}

impl StepEngine {
    pub fn new(
        sensor: Arc<dyn StepSensor>,
        store: Arc<dyn BaselineStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sensor,
            store,
            clock,
            state: Mutex::new(BaselineState::default()),
        }
    }

    pub fn sensor(&self) -> &Arc<dyn StepSensor> {
        &self.sensor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Make sure a baseline for today is in memory (and persisted).
    /// Idempotent within a day.
    pub async fn initialize_baseline(&self) -> BaselineRecord {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.ensure_baseline(&mut state, now).await;
        BaselineRecord::new(state.current_baseline, now.date_naive())
    }

    /// The in-memory baseline, if one has been initialized.
    pub async fn current_baseline(&self) -> Option<BaselineRecord> {
        self.state.lock().await.record()
    }

    /// The durable record, read directly from the store.
    pub async fn stored_baseline(&self) -> Result<Option<BaselineRecord>, StoreError> {
        self.store.load().await
    }

    /// Steps walked today. Never fails; sensor faults read as 0.
    pub async fn today_steps(&self) -> u64 {
        self.snapshot().await.steps
    }

    /// Run one reconciliation pass.
    pub async fn snapshot(&self) -> TodaySnapshot {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut state = self.state.lock().await;

        if state.baseline_date != Some(today) {
            self.ensure_baseline(&mut state, now).await;
        }

        let cumulative = match self.midnight_to_now(now).await {
            Some(count) => count,
            None => {
                // A failed read must not look like a counter reset.
                return TodaySnapshot {
                    date: today,
                    steps: 0,
                    cumulative: None,
                    baseline: state.current_baseline,
                    reset_detected: false,
                };
            }
        };

        let mut reset_detected = false;
        if cumulative < state.current_baseline {
            tracing::warn!(
                cumulative,
                baseline = state.current_baseline,
                date = %day_key(today),
                "step counter went backwards, treating as sensor reset"
            );
            state.current_baseline = 0;
            state.baseline_date = Some(today);
            self.persist(BaselineRecord::new(0, today)).await;
            reset_detected = true;
        }

        let steps = cumulative.saturating_sub(state.current_baseline);
        tracing::debug!(cumulative, baseline = state.current_baseline, steps, "reconciled today's steps");

        TodaySnapshot {
            date: today,
            steps,
            cumulative: Some(cumulative),
            baseline: state.current_baseline,
            reset_detected,
        }
    }

    /// Drop the durable and in-memory baseline. The next pass re-initializes.
    pub async fn reset_baseline(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.store.clear().await?;
        *state = BaselineState::default();
        tracing::info!("step baseline cleared");
        Ok(())
    }

    /// Debug report: availability, permission, stored baseline and the raw
    /// counter, without initializing or persisting anything.
    pub async fn diagnose(&self) -> StepDiagnostics {
        let gate = CapabilityGate::new(self.sensor.clone());
        let now = self.clock.now();
        let available = gate.is_available().await;
        let permission = gate.check_permission().await;
        let stored_baseline = match self.store.load().await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored step baseline");
                None
            }
        };

        let raw_steps = if available && permission.is_granted() {
            self.midnight_to_now(now).await
        } else {
            None
        };
        let computed_steps = match (raw_steps, stored_baseline) {
            (Some(raw), Some(record)) => Some(raw.saturating_sub(record.baseline)),
            _ => None,
        };

        StepDiagnostics {
            sensor_kind: self.sensor.kind(),
            available,
            permission,
            stored_baseline,
            today: day_key(now.date_naive()),
            raw_steps,
            computed_steps,
        }
    }

    async fn ensure_baseline(&self, state: &mut BaselineState, now: DateTime<Local>) {
        let today = now.date_naive();
        if state.baseline_date == Some(today) {
            return;
        }

        match self.store.load().await {
            Ok(Some(record)) if record.is_current(today) => {
                tracing::debug!(baseline = record.baseline, "adopting stored step baseline");
                state.current_baseline = record.baseline;
                state.baseline_date = Some(record.date);
            }
            Ok(stale) => {
                if let Some(record) = stale {
                    tracing::info!(
                        stored_date = %day_key(record.date),
                        today = %day_key(today),
                        "stored step baseline is from another day, re-initializing"
                    );
                }
                let baseline = self.midnight_to_now(now).await.unwrap_or(0);
                state.current_baseline = baseline;
                state.baseline_date = Some(today);
                self.persist(BaselineRecord::new(baseline, today)).await;
                tracing::info!(baseline, date = %day_key(today), "initialized step baseline");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load step baseline, falling back to 0");
                state.current_baseline = 0;
                state.baseline_date = Some(today);
            }
        }
    }

    async fn persist(&self, record: BaselineRecord) {
        if let Err(e) = self.store.save(record).await {
            tracing::warn!(
                error = %e,
                baseline = record.baseline,
                date = %day_key(record.date),
                "failed to persist step baseline"
            );
        }
    }

    async fn midnight_to_now(&self, now: DateTime<Local>) -> Option<u64> {
        let start = local_midnight(now.date_naive());
        match self.sensor.steps_between(start, now).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "step sensor query failed, counting 0 steps");
                None
            }
        }
    }
}
