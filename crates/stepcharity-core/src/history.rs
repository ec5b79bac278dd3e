//! Per-day step history reconstructed by direct range queries.
//!
//! Unlike the live engine this does not use a baseline: each day is queried
//! on its own window, and a failing day reads as 0 without affecting the
//! others. Such a day is flagged as not fetched so callers never write the
//! substitute value anywhere.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{day_window, last_n_days, Clock};
use crate::ledger::GlobalSettings;
use crate::sensor::StepSensor;

/// Longest history the backfill reconstructs.
pub const MAX_BACKFILL_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySteps {
    pub date: NaiveDate,
    pub steps: u64,
    /// False when the sensor query failed and `steps` is the 0 stand-in.
    pub fetched: bool,
}

impl DaySteps {
    pub fn new(date: NaiveDate, steps: u64) -> Self {
        Self {
            date,
            steps,
            fetched: true,
        }
    }

    pub fn unavailable(date: NaiveDate) -> Self {
        Self {
            date,
            steps: 0,
            fetched: false,
        }
    }
}

pub struct HistoryBackfill {
    sensor: Arc<dyn StepSensor>,
    clock: Arc<dyn Clock>,
}

impl HistoryBackfill {
    pub fn new(sensor: Arc<dyn StepSensor>, clock: Arc<dyn Clock>) -> Self {
        Self { sensor, clock }
    }

    /// Steps for the last `n` days (today included), oldest first.
    ///
    /// `n` is capped at [`MAX_BACKFILL_DAYS`].
    pub async fn last_n_days(&self, n: usize) -> Vec<DaySteps> {
        if n > MAX_BACKFILL_DAYS {
            tracing::warn!(requested = n, max = MAX_BACKFILL_DAYS, "backfill window capped");
        }
        let now = self.clock.now();
        let days = last_n_days(now.date_naive(), n.min(MAX_BACKFILL_DAYS));

        let mut history = Vec::with_capacity(days.len());
        for date in days {
            let (start, end) = day_window(date, now);
            let day = match self.sensor.steps_between(start, end).await {
                Ok(steps) => DaySteps::new(date, steps),
                Err(e) => {
                    tracing::warn!(error = %e, date = %date, "failed to fetch steps for day, using 0");
                    DaySteps::unavailable(date)
                }
            };
            history.push(day);
        }
        history
    }

    pub async fn last_7_days(&self) -> Vec<DaySteps> {
        self.last_n_days(MAX_BACKFILL_DAYS).await
    }
}

/// A day of history after goal evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepHistoryItem {
    pub date: NaiveDate,
    pub steps: u64,
    pub goal_achieved: bool,
    pub charity_earned: f64,
}

impl StepHistoryItem {
    pub fn evaluate(day: DaySteps, settings: &GlobalSettings) -> Self {
        let outcome = crate::goal::evaluate(day.steps, settings);
        Self {
            date: day.date,
            steps: day.steps,
            goal_achieved: outcome.goal_achieved,
            charity_earned: outcome.charity_earned,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total_steps: u64,
    pub total_charity: f64,
    pub goals_achieved: usize,
    pub average_steps: u64,
}

impl HistorySummary {
    pub fn from_items(items: &[StepHistoryItem]) -> Self {
        let total_steps: u64 = items.iter().map(|d| d.steps).sum();
        let total_charity: f64 = items.iter().map(|d| d.charity_earned).sum();
        let goals_achieved = items.iter().filter(|d| d.goal_achieved).count();
        let average_steps = if items.is_empty() {
            0
        } else {
            (total_steps as f64 / items.len() as f64).round() as u64
        };
        Self {
            total_steps,
            total_charity,
            goals_achieved,
            average_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ManualClock;
    use crate::sensor::{ManualCounter, PedometerSensor};

    fn backfill() -> (Arc<ManualCounter>, Arc<ManualClock>, HistoryBackfill) {
        let counter = Arc::new(ManualCounter::new());
        let clock = Arc::new(ManualClock::at(2024, 3, 20, 15, 0));
        let history = HistoryBackfill::new(
            Arc::new(PedometerSensor::new(counter.clone(), 34)),
            clock.clone(),
        );
        (counter, clock, history)
    }

    #[tokio::test]
    async fn test_seven_days_ascending_ending_today() {
        let (counter, clock, history) = backfill();
        let today = clock.today();
        for (i, date) in last_n_days(today, 7).into_iter().enumerate() {
            counter.set_count(date, 1000 * (i as u64 + 1));
        }

        let days = history.last_7_days().await;
        assert_eq!(days.len(), 7);
        assert_eq!(days.last().map(|d| d.date), Some(today));
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(days[0].steps, 1000);
        assert_eq!(days[6].steps, 7000);
    }

    #[tokio::test]
    async fn test_failing_days_are_isolated() {
        let (counter, clock, history) = backfill();
        let days = last_n_days(clock.today(), 7);
        for date in &days {
            counter.set_count(*date, 500);
        }
        for date in &days[..6] {
            counter.set_failing(*date, true);
        }

        let result = history.last_7_days().await;
        assert_eq!(result.len(), 7);
        assert!(result[..6].iter().all(|d| d.steps == 0 && !d.fetched));
        assert_eq!(result[6].steps, 500);
        assert!(result[6].fetched);
    }

    #[tokio::test]
    async fn test_window_is_capped_and_zero_is_empty() {
        let (_counter, _clock, history) = backfill();
        assert_eq!(history.last_n_days(30).await.len(), MAX_BACKFILL_DAYS);
        assert!(history.last_n_days(0).await.is_empty());
    }

    #[test]
    fn test_summary_counts_goals_and_rounds_average() {
        let settings = GlobalSettings {
            daily_step_goal: 5000,
            charity_amount_per_goal: 2.5,
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let items: Vec<_> = [6000, 4000, 5001]
            .into_iter()
            .map(|steps| StepHistoryItem::evaluate(DaySteps::new(date, steps), &settings))
            .collect();

        let summary = HistorySummary::from_items(&items);
        assert_eq!(summary.total_steps, 15001);
        assert_eq!(summary.goals_achieved, 2);
        assert_eq!(summary.total_charity, 5.0);
        assert_eq!(summary.average_steps, 5000);
        assert_eq!(HistorySummary::from_items(&[]), HistorySummary::default());
    }
}
