//! Local calendar-day helpers and the clock capability.
//!
//! A "day" is always a local calendar day. Day keys are `YYYY-MM-DD`
//! strings; the remote ledger and the baseline store both use them.

use std::sync::Mutex;

use chrono::{DateTime, Days, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};

use crate::error::ValidationError;

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Source of "now". Injected so day rollover can be driven in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Local wall time on the given day. Falls back to the current time if the
    /// requested instant does not exist in the local zone.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let now = Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Local>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Format a calendar day as `YYYY-MM-DD`.
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` day key.
pub fn parse_day_key(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DAY_KEY_FORMAT)
        .map_err(|_| ValidationError::InvalidDay(value.to_string()))
}

/// Start of the given local day.
///
/// When midnight is skipped by a DST jump the first valid instant of the
/// day is used instead.
pub fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Walk forward until the zone has a valid mapping.
            (1..=180)
                .filter_map(|minutes| {
                    Local
                        .from_local_datetime(&(naive + chrono::Duration::minutes(minutes)))
                        .earliest()
                })
                .next()
                .unwrap_or_else(|| Local.from_utc_datetime(&naive))
        }
    }
}

/// Half-open query window for a day: `[midnight, next midnight)` for past
/// days and `[midnight, now)` for today.
pub fn day_window(date: NaiveDate, now: DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
    let start = local_midnight(date);
    if date >= now.date_naive() {
        return (start, now.max(start));
    }
    let end = date
        .checked_add_days(Days::new(1))
        .map(local_midnight)
        .unwrap_or(now);
    (start, end)
}

/// The last `n` calendar days ending at (and including) `today`, oldest first.
pub fn last_n_days(today: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n as u64)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .collect()
}
