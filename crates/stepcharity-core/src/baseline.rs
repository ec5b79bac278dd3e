//! Durable baseline store.
//!
//! The baseline pair (`step_baseline`, `step_baseline_date`) is persisted as
//! two kv keys that are always written and cleared together.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{day_key, parse_day_key};
use crate::error::StoreError;
use crate::storage::Database;

pub const BASELINE_KEY: &str = "step_baseline";
pub const BASELINE_DATE_KEY: &str = "step_baseline_date";

/// Cumulative sensor count captured for a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub baseline: u64,
    pub date: NaiveDate,
}

impl BaselineRecord {
    pub fn new(baseline: u64, date: NaiveDate) -> Self {
        Self { baseline, date }
    }

    /// A record is only valid on the day it was captured.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.date == today
    }
}

/// Persistence for the baseline pair.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Returns `None` if nothing (or nothing usable) is stored.
    async fn load(&self) -> Result<Option<BaselineRecord>, StoreError>;

    /// Writes both fields atomically.
    async fn save(&self, record: BaselineRecord) -> Result<(), StoreError>;

    /// Removes the record. Debug/reset path only.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Baseline store on top of the SQLite kv table.
pub struct SqliteBaselineStore {
    db: Arc<Database>,
}

impl SqliteBaselineStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BaselineStore for SqliteBaselineStore {
    async fn load(&self) -> Result<Option<BaselineRecord>, StoreError> {
        let baseline = self.db.kv_get(BASELINE_KEY)?;
        let date = self.db.kv_get(BASELINE_DATE_KEY)?;
        Ok(decode_pair(baseline.as_deref(), date.as_deref()))
    }

    async fn save(&self, record: BaselineRecord) -> Result<(), StoreError> {
        let baseline = record.baseline.to_string();
        let date = day_key(record.date);
        self.db
            .kv_set_all(&[(BASELINE_KEY, &baseline), (BASELINE_DATE_KEY, &date)])
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.db.kv_delete_all(&[BASELINE_KEY, BASELINE_DATE_KEY])
    }
}

/// Volatile store. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    record: Mutex<Option<BaselineRecord>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: BaselineRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn load(&self) -> Result<Option<BaselineRecord>, StoreError> {
        let guard = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(*guard)
    }

    async fn save(&self, record: BaselineRecord) -> Result<(), StoreError> {
        let mut guard = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        *guard = Some(record);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        *guard = None;
        Ok(())
    }
}

/// Both halves must be present and well-formed; anything else reads as absent.
fn decode_pair(baseline: Option<&str>, date: Option<&str>) -> Option<BaselineRecord> {
    let (baseline, date) = (baseline?, date?);
    let parsed_baseline = baseline.trim().parse::<u64>();
    let parsed_date = parse_day_key(date);
    match (parsed_baseline, parsed_date) {
        (Ok(baseline), Ok(date)) => Some(BaselineRecord { baseline, date }),
        _ => {
            tracing::warn!(baseline, date, "ignoring malformed stored step baseline");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn store() -> (Arc<Database>, SqliteBaselineStore) {
        let db = Arc::new(Database::open_memory().unwrap());
        (db.clone(), SqliteBaselineStore::new(db))
    }

    #[tokio::test]
    async fn test_empty_store_loads_none() {
        let (_db, store) = store();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load_uses_two_keys() {
        let (db, store) = store();
        store.save(BaselineRecord::new(1200, day(1))).await.unwrap();

        assert_eq!(db.kv_get(BASELINE_KEY).unwrap().as_deref(), Some("1200"));
        assert_eq!(
            db.kv_get(BASELINE_DATE_KEY).unwrap().as_deref(),
            Some("2024-01-01")
        );
        assert_eq!(
            store.load().await.unwrap(),
            Some(BaselineRecord::new(1200, day(1)))
        );
    }

    #[tokio::test]
    async fn test_half_written_pair_reads_as_absent() {
        let (db, store) = store();
        db.kv_set(BASELINE_KEY, "500").unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_values_read_as_absent() {
        let (db, store) = store();
        db.kv_set_all(&[(BASELINE_KEY, "-3"), (BASELINE_DATE_KEY, "2024-01-01")])
            .unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        db.kv_set_all(&[(BASELINE_KEY, "3"), (BASELINE_DATE_KEY, "yesterday")])
            .unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_removes_both_keys() {
        let (db, store) = store();
        store.save(BaselineRecord::new(7, day(2))).await.unwrap();
        store.clear().await.unwrap();
        assert!(db.kv_get(BASELINE_KEY).unwrap().is_none());
        assert!(db.kv_get(BASELINE_DATE_KEY).unwrap().is_none());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[test]
    fn test_record_is_current_only_on_its_day() {
        let record = BaselineRecord::new(10, day(3));
        assert!(record.is_current(day(3)));
        assert!(!record.is_current(day(4)));
    }
}
