use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// State changes published by the tracker.
/// The CLI prints them; embedders subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// Live stream delivered a new value for today.
    StepsUpdated {
        date: NaiveDate,
        steps: u64,
        at: DateTime<Utc>,
    },
    /// A day's row was written to the ledger.
    DaySynced {
        date: NaiveDate,
        steps: u64,
        goal_achieved: bool,
        charity_earned: f64,
        at: DateTime<Utc>,
    },
    /// Upsert failed. The next value transition retries.
    SyncFailed {
        date: NaiveDate,
        steps: u64,
        error: String,
        at: DateTime<Utc>,
    },
}

impl TrackerEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            TrackerEvent::StepsUpdated { date, .. }
            | TrackerEvent::DaySynced { date, .. }
            | TrackerEvent::SyncFailed { date, .. } => *date,
        }
    }
}
