//! Tracking session: capability gate, live engine and ledger wired together.
//!
//! The live engine is the source of truth for today. History sync uses the
//! backfill for past days and substitutes the engine value for today, so a
//! row written by `sync_history` never contradicts one written by the live
//! stream. The two views differ by the steps walked before the first
//! baseline capture of the day, which the engine does not count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::calendar::last_n_days;
use crate::device::DeviceIdentity;
use crate::engine::{StepEngine, StepSubscription, StepUpdate};
use crate::error::{CoreError, LedgerError, Result};
use crate::events::TrackerEvent;
use crate::goal::{self, GoalOutcome};
use crate::history::{DaySteps, HistoryBackfill, HistorySummary, StepHistoryItem, MAX_BACKFILL_DAYS};
use crate::ledger::{
    DailyStepRecord, DailyStepUpsert, Employee, GlobalSettings, RegistrationForm, StepLedger,
    StepSyncResult,
};
use crate::sensor::CapabilityGate;

const EVENT_CAPACITY: usize = 64;

/// Everything needed to attribute steps to a ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub device_id: String,
    pub employee: Employee,
    pub settings: GlobalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub today_steps: u64,
    pub daily_goal: u64,
    pub progress_pct: f64,
    pub today: GoalOutcome,
    /// Last 7 days as stored in the ledger, oldest first, zero-filled.
    pub week: Vec<StepHistoryItem>,
    pub week_summary: HistorySummary,
    pub lifetime_steps: u64,
    pub total_charity: f64,
}

struct Running {
    subscription: StepSubscription,
    worker: JoinHandle<()>,
}

pub struct StepTracker {
    engine: Arc<StepEngine>,
    backfill: HistoryBackfill,
    ledger: Arc<dyn StepLedger>,
    identity: Arc<dyn DeviceIdentity>,
    events: broadcast::Sender<TrackerEvent>,
    running: Mutex<Option<Running>>,
}

impl StepTracker {
    pub fn new(
        engine: Arc<StepEngine>,
        ledger: Arc<dyn StepLedger>,
        identity: Arc<dyn DeviceIdentity>,
    ) -> Self {
        let backfill = HistoryBackfill::new(engine.sensor().clone(), engine.clock().clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            engine,
            backfill,
            ledger,
            identity,
            events,
            running: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<StepEngine> {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<dyn StepLedger> {
        &self.ledger
    }

    pub fn events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Device id, then the employee registered for it, then goal settings.
    pub async fn resolve_session(&self) -> Result<Session> {
        let device_id = self
            .identity
            .device_id()
            .ok_or(CoreError::DeviceIdUnavailable)?;
        let employee = self
            .ledger
            .find_employee_by_device(&device_id)
            .await?
            .ok_or_else(|| CoreError::NotRegistered {
                device_id: device_id.clone(),
            })?;
        let settings = self
            .ledger
            .fetch_global_settings()
            .await?
            .ok_or(LedgerError::MissingSettings)?;

        tracing::debug!(employee_id = %employee.employee_id, %device_id, "resolved tracking session");
        Ok(Session {
            device_id,
            employee,
            settings,
        })
    }

    /// Register this device for the employee in `form`.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Employee> {
        let device_id = self
            .identity
            .device_id()
            .ok_or(CoreError::DeviceIdUnavailable)?;
        Ok(self.ledger.register_employee(form, &device_id).await?)
    }

    /// Availability and permission, checked before anything reads the sensor.
    async fn authorize(&self) -> Result<()> {
        CapabilityGate::new(self.engine.sensor().clone())
            .authorize()
            .await?;
        Ok(())
    }

    /// Compute today's steps and upsert them.
    ///
    /// A failed sensor read is reported instead of writing its 0 stand-in.
    pub async fn sync_today(&self, session: &Session) -> Result<StepSyncResult> {
        self.authorize().await?;
        let snapshot = self.engine.snapshot().await;
        if snapshot.cumulative.is_none() {
            tracing::warn!(date = %snapshot.date, "step sensor read failed, not syncing today");
            return Ok(StepSyncResult::failed("step sensor read failed"));
        }
        let day = DaySteps::new(snapshot.date, snapshot.steps);
        Ok(upsert_day(self.ledger.as_ref(), &self.events, session, day)
            .await
            .into())
    }

    /// Backfill `days` days and upsert each one. Days the sensor could not
    /// report and days whose upsert failed are logged and left out.
    pub async fn sync_history(
        &self,
        session: &Session,
        days: usize,
    ) -> Result<Vec<StepHistoryItem>> {
        self.authorize().await?;
        let today = self.engine.clock().today();
        let mut history = self.backfill.last_n_days(days).await;
        if let Some(entry) = history.iter_mut().find(|d| d.date == today) {
            let snapshot = self.engine.snapshot().await;
            *entry = match snapshot.cumulative {
                Some(_) => DaySteps::new(today, snapshot.steps),
                None => DaySteps::unavailable(today),
            };
        }

        let mut synced = Vec::with_capacity(history.len());
        for day in history {
            if !day.fetched {
                tracing::warn!(date = %day.date, "no step data for day, keeping stored row");
                continue;
            }
            if upsert_day(self.ledger.as_ref(), &self.events, session, day)
                .await
                .is_ok()
            {
                synced.push(StepHistoryItem::evaluate(day, &session.settings));
            }
        }
        Ok(synced)
    }

    /// Authorize the sensor and start the live stream.
    ///
    /// With a session every delivered value is upserted by a single worker,
    /// in delivery order. Without one, values are only published as events.
    pub async fn start(&self, session: Option<Session>, poll_interval: Duration) -> Result<()> {
        if self.is_running() {
            return Err(CoreError::Custom("tracker is already running".into()));
        }
        self.authorize().await?;

        let (tx, rx) = mpsc::unbounded_channel::<StepUpdate>();
        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&self.ledger),
            self.events.clone(),
            session,
        ));
        let subscription = self
            .engine
            .subscribe(poll_interval, move |update| {
                if tx.send(update).is_err() {
                    tracing::debug!("sync worker gone, dropping step update");
                }
            })
            .await;

        let mut running = lock(&self.running);
        if running.is_some() {
            drop(running);
            let mut subscription = subscription;
            subscription.unsubscribe();
            worker.abort();
            return Err(CoreError::Custom("tracker is already running".into()));
        }
        *running = Some(Running {
            subscription,
            worker,
        });
        tracing::info!("step tracking started");
        Ok(())
    }

    /// Stop the live stream and wait for queued syncs to finish.
    pub async fn stop(&self) {
        let running = lock(&self.running).take();
        if let Some(Running {
            mut subscription,
            worker,
        }) = running
        {
            // Dropping the callback closes the channel; the worker drains and exits.
            subscription.unsubscribe();
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "sync worker panicked");
                }
            }
            tracing::info!("step tracking stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Today from the engine, the week and totals from the ledger.
    pub async fn dashboard(&self, session: &Session) -> Result<Dashboard> {
        self.authorize().await?;
        let snapshot = self.engine.snapshot().await;
        let employee_id = &session.employee.employee_id;
        let days = last_n_days(snapshot.date, MAX_BACKFILL_DAYS);
        let (first, last) = match (days.first(), days.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => (snapshot.date, snapshot.date),
        };

        let stored: HashMap<NaiveDate, u64> = self
            .ledger
            .daily_steps_between(employee_id, first, last)
            .await?
            .into_iter()
            .map(|r| (r.step_date, r.step_count))
            .collect();

        let week: Vec<StepHistoryItem> = days
            .into_iter()
            .map(|date| {
                let steps = if date == snapshot.date {
                    snapshot.steps
                } else {
                    stored.get(&date).copied().unwrap_or(0)
                };
                StepHistoryItem::evaluate(DaySteps::new(date, steps), &session.settings)
            })
            .collect();

        Ok(Dashboard {
            date: snapshot.date,
            today_steps: snapshot.steps,
            daily_goal: session.settings.daily_step_goal,
            progress_pct: goal::progress_pct(snapshot.steps, &session.settings),
            today: goal::evaluate(snapshot.steps, &session.settings),
            week_summary: HistorySummary::from_items(&week),
            week,
            lifetime_steps: self.ledger.lifetime_steps(employee_id).await?,
            total_charity: self.ledger.total_charity_earned(employee_id).await?,
        })
    }
}

impl Drop for StepTracker {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.running).take() {
            running.worker.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn run_worker(
    mut updates: mpsc::UnboundedReceiver<StepUpdate>,
    ledger: Arc<dyn StepLedger>,
    events: broadcast::Sender<TrackerEvent>,
    session: Option<Session>,
) {
    while let Some(update) = updates.recv().await {
        let _ = events.send(TrackerEvent::StepsUpdated {
            date: update.date,
            steps: update.steps,
            at: Utc::now(),
        });
        if let Some(session) = &session {
            let day = DaySteps::new(update.date, update.steps);
            // Failures are already published as SyncFailed.
            let _ = upsert_day(ledger.as_ref(), &events, session, day).await;
        }
    }
    tracing::debug!("sync worker finished");
}

async fn upsert_day(
    ledger: &dyn StepLedger,
    events: &broadcast::Sender<TrackerEvent>,
    session: &Session,
    day: DaySteps,
) -> std::result::Result<DailyStepRecord, LedgerError> {
    let outcome = goal::evaluate(day.steps, &session.settings);
    let upsert = DailyStepUpsert::new(
        &session.employee.employee_id,
        &session.device_id,
        day.date,
        day.steps,
        outcome,
    );

    match ledger.upsert_daily_steps(upsert).await {
        Ok(record) => {
            tracing::info!(
                employee_id = %session.employee.employee_id,
                date = %day.date,
                steps = day.steps,
                goal_achieved = outcome.goal_achieved,
                "synced daily steps"
            );
            let _ = events.send(TrackerEvent::DaySynced {
                date: day.date,
                steps: day.steps,
                goal_achieved: outcome.goal_achieved,
                charity_earned: outcome.charity_earned,
                at: Utc::now(),
            });
            Ok(record)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                employee_id = %session.employee.employee_id,
                date = %day.date,
                steps = day.steps,
                "failed to sync daily steps"
            );
            let _ = events.send(TrackerEvent::SyncFailed {
                date: day.date,
                steps: day.steps,
                error: e.to_string(),
                at: Utc::now(),
            });
            Err(e)
        }
    }
}
