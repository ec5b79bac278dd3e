//! Live "today steps" stream.
//!
//! Two triggers feed one emission path: a polling tick and the sensor's
//! change events. Both go through [`StepEngine::snapshot`], and a value is
//! delivered only when it differs from the previously delivered one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::reconcile::{StepEngine, TodaySnapshot};
use crate::sensor::SensorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub date: NaiveDate,
    pub steps: u64,
}

impl From<TodaySnapshot> for StepUpdate {
    fn from(snapshot: TodaySnapshot) -> Self {
        Self {
            date: snapshot.date,
            steps: snapshot.steps,
        }
    }
}

type Callback = Box<dyn FnMut(StepUpdate) + Send + 'static>;

/// Callback slot plus de-duplication state. Delivery happens under the
/// lock, so once `unsubscribe` has taken it no callback can start.
struct Delivery {
    active: bool,
    last: Option<u64>,
    callback: Option<Callback>,
}

impl Delivery {
    fn deliver(&mut self, update: StepUpdate) {
        if !self.active || self.last == Some(update.steps) {
            return;
        }
        self.last = Some(update.steps);
        if let Some(callback) = self.callback.as_mut() {
            callback(update);
        }
    }
}

fn lock(delivery: &Mutex<Delivery>) -> MutexGuard<'_, Delivery> {
    match delivery.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle for a live subscription. Dropping it unsubscribes.
///
/// The callback must not call back into `unsubscribe` on the same handle.
pub struct StepSubscription {
    delivery: Arc<Mutex<Delivery>>,
    task: Option<JoinHandle<()>>,
}

impl StepSubscription {
    /// Stop the timer and release the sensor listener. Idempotent; no
    /// callback fires after this returns.
    pub fn unsubscribe(&mut self) {
        {
            let mut delivery = lock(&self.delivery);
            delivery.active = false;
            delivery.callback = None;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.delivery).active
    }
}

impl Drop for StepSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl StepEngine {
    /// Subscribe to today's step count.
    ///
    /// The callback runs once with the current value before this returns,
    /// then again whenever a poll tick or sensor event yields a new value.
    pub async fn subscribe<F>(self: &Arc<Self>, poll_interval: Duration, callback: F) -> StepSubscription
    where
        F: FnMut(StepUpdate) + Send + 'static,
    {
        let delivery = Arc::new(Mutex::new(Delivery {
            active: true,
            last: None,
            callback: Some(Box::new(callback)),
        }));

        let initial = self.snapshot().await;
        lock(&delivery).deliver(initial.into());

        let task = tokio::spawn(run_stream(
            Arc::clone(self),
            poll_interval,
            self.sensor().watch(),
            Arc::clone(&delivery),
        ));

        StepSubscription {
            delivery,
            task: Some(task),
        }
    }
}

enum Trigger {
    Tick,
    Changed,
    Closed,
}

async fn run_stream(
    engine: Arc<StepEngine>,
    poll_interval: Duration,
    mut events: Option<broadcast::Receiver<SensorEvent>>,
    delivery: Arc<Mutex<Delivery>>,
) {
    let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => Trigger::Tick,
            event = next_event(&mut events) => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => Trigger::Changed,
                Err(RecvError::Closed) => Trigger::Closed,
            },
        };

        match trigger {
            Trigger::Closed => {
                tracing::debug!("sensor event stream closed, continuing with polling only");
                events = None;
                continue;
            }
            Trigger::Tick | Trigger::Changed => {}
        }

        if !lock(&delivery).active {
            break;
        }
        let snapshot = engine.snapshot().await;
        // Results of a pass that finished after unsubscribe are discarded here.
        let mut guard = lock(&delivery);
        if !guard.active {
            break;
        }
        guard.deliver(snapshot.into());
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<SensorEvent>>,
) -> Result<SensorEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
