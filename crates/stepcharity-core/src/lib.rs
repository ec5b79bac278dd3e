//! # StepCharity Core Library
//!
//! This library provides the core logic for the StepCharity step tracker.
//! Employees walk, the device step sensor counts, and every day that meets
//! the program goal earns a fixed charity contribution. The `stepcharity`
//! CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Sensors**: a cumulative step counter or a health-store sample query,
//!   behind one [`StepSensor`] trait and a [`CapabilityGate`]
//! - **Engine**: baseline reconciliation that turns a cumulative counter into
//!   "steps since local midnight", with a de-duplicated live stream
//! - **Backfill**: per-day range queries for the last 7 days
//! - **Ledger**: one row per employee and day, upserted locally (SQLite) or
//!   against a PostgREST backend
//! - **Storage**: SQLite key-value store for the baseline and TOML configuration
//!
//! ## Key Components
//!
//! - [`StepEngine`]: baseline reconciliation and live updates
//! - [`StepTracker`]: gate, engine and ledger wired into one session
//! - [`StepLedger`]: backend store operations
//! - [`Config`]: application configuration management

pub mod baseline;
pub mod calendar;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod goal;
pub mod history;
pub mod ledger;
pub mod sensor;
pub mod storage;
pub mod tracker;

pub use baseline::{BaselineRecord, BaselineStore, MemoryBaselineStore, SqliteBaselineStore};
pub use calendar::{Clock, ManualClock, SystemClock};
pub use device::{DeviceIdentity, FileDeviceIdentity};
pub use engine::{StepDiagnostics, StepEngine, StepSubscription, StepUpdate, TodaySnapshot};
pub use error::{
    CapabilityError, ConfigError, CoreError, LedgerError, SensorError, StoreError, ValidationError,
};
pub use events::TrackerEvent;
pub use goal::GoalOutcome;
pub use history::{DaySteps, HistoryBackfill, HistorySummary, StepHistoryItem};
pub use ledger::{
    Company, DailyStepRecord, DailyStepUpsert, Employee, GlobalSettings, RegistrationForm,
    RestLedger, SqliteLedger, StepLedger, StepSyncResult,
};
pub use sensor::{CapabilityGate, PermissionStatus, SensorKind, StepSensor};
pub use storage::{Config, Database};
pub use tracker::{Dashboard, Session, StepTracker};
