//! Cumulative counter sensor family.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use tokio::sync::broadcast;

use super::{PermissionStatus, SensorEvent, SensorKind, StepSensor};
use crate::error::SensorError;

/// API level from which activity recognition needs a runtime grant.
pub const RUNTIME_PERMISSION_API_LEVEL: u32 = 29;

/// Raw platform counter API.
#[async_trait]
pub trait CounterDevice: Send + Sync {
    async fn is_present(&self) -> Result<bool, SensorError>;

    async fn authorization(&self) -> Result<PermissionStatus, SensorError>;

    async fn request_authorization(&self) -> Result<PermissionStatus, SensorError>;

    /// Cumulative count reported for `[start, end)`.
    async fn count(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64, SensorError>;

    fn changes(&self) -> Option<broadcast::Receiver<SensorEvent>>;
}

/// Sensor-API based step sensor.
pub struct PedometerSensor {
    device: Arc<dyn CounterDevice>,
    api_level: u32,
}

impl PedometerSensor {
    pub fn new(device: Arc<dyn CounterDevice>, api_level: u32) -> Self {
        Self { device, api_level }
    }

    fn needs_runtime_permission(&self) -> bool {
        self.api_level >= RUNTIME_PERMISSION_API_LEVEL
    }
}

#[async_trait]
impl StepSensor for PedometerSensor {
    fn kind(&self) -> SensorKind {
        SensorKind::Pedometer
    }

    async fn is_available(&self) -> Result<bool, SensorError> {
        self.device.is_present().await
    }

    async fn request_permission(&self) -> Result<PermissionStatus, SensorError> {
        if !self.needs_runtime_permission() {
            return Ok(PermissionStatus::Granted);
        }
        self.device.request_authorization().await
    }

    async fn check_permission(&self) -> Result<PermissionStatus, SensorError> {
        if !self.needs_runtime_permission() {
            return Ok(PermissionStatus::Granted);
        }
        self.device.authorization().await
    }

    async fn steps_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64, SensorError> {
        if end <= start {
            return Ok(0);
        }
        self.device.count(start, end).await
    }

    fn watch(&self) -> Option<broadcast::Receiver<SensorEvent>> {
        self.device.changes()
    }
}

#[derive(Debug)]
struct CounterState {
    present: bool,
    permission: PermissionStatus,
    grant_on_request: bool,
    totals: BTreeMap<NaiveDate, u64>,
    failing: HashSet<NaiveDate>,
}

/// Scriptable in-memory counter.
///
/// The count reported for a query is keyed by the local day the window
/// starts on. Every `set_count` publishes a change event, as a real counter
/// would on movement.
#[derive(Debug)]
pub struct ManualCounter {
    state: Mutex<CounterState>,
    events: broadcast::Sender<SensorEvent>,
    permission_requests: AtomicUsize,
    queries: AtomicUsize,
}

impl Default for ManualCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualCounter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(CounterState {
                present: true,
                permission: PermissionStatus::Granted,
                grant_on_request: true,
                totals: BTreeMap::new(),
                failing: HashSet::new(),
            }),
            events,
            permission_requests: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, CounterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_present(&self, present: bool) {
        self.state().present = present;
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        self.state().permission = permission;
    }

    pub fn set_grant_on_request(&self, grant: bool) {
        self.state().grant_on_request = grant;
    }

    /// Set the cumulative count for windows starting on `day` and notify watchers.
    pub fn set_count(&self, day: NaiveDate, count: u64) {
        self.state().totals.insert(day, count);
        let _ = self.events.send(SensorEvent { at: Local::now() });
    }

    /// Make queries for windows starting on `day` fail (or succeed again).
    pub fn set_failing(&self, day: NaiveDate, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(day);
        } else {
            state.failing.remove(&day);
        }
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    /// Number of count queries served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterDevice for ManualCounter {
    async fn is_present(&self) -> Result<bool, SensorError> {
        Ok(self.state().present)
    }

    async fn authorization(&self) -> Result<PermissionStatus, SensorError> {
        Ok(self.state().permission)
    }

    async fn request_authorization(&self) -> Result<PermissionStatus, SensorError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.grant_on_request {
            state.permission = PermissionStatus::Granted;
        }
        Ok(state.permission)
    }

    async fn count(
        &self,
        start: DateTime<Local>,
        _end: DateTime<Local>,
    ) -> Result<u64, SensorError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        let day = start.date_naive();
        if !state.present {
            return Err(SensorError::Unavailable);
        }
        if state.failing.contains(&day) {
            return Err(SensorError::QueryFailed(format!("counter read failed for {day}")));
        }
        Ok(state.totals.get(&day).copied().unwrap_or(0))
    }

    fn changes(&self) -> Option<broadcast::Receiver<SensorEvent>> {
        Some(self.events.subscribe())
    }
}

/// Counter readings kept in a JSON file of `{"YYYY-MM-DD": cumulative}`.
///
/// Stands in for a device counter on hosts without one. The file is re-read
/// on every query; a missing file means no sensor. No change events.
#[derive(Debug, Clone)]
pub struct CounterFile {
    path: PathBuf,
}

impl CounterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<NaiveDate, u64>, SensorError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SensorError::QueryFailed(format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| SensorError::QueryFailed(format!("{}: {e}", self.path.display())))
    }

    fn status(&self) -> PermissionStatus {
        if self.path.is_file() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}

#[async_trait]
impl CounterDevice for CounterFile {
    async fn is_present(&self) -> Result<bool, SensorError> {
        Ok(self.path.is_file())
    }

    async fn authorization(&self) -> Result<PermissionStatus, SensorError> {
        Ok(self.status())
    }

    async fn request_authorization(&self) -> Result<PermissionStatus, SensorError> {
        Ok(self.status())
    }

    async fn count(
        &self,
        start: DateTime<Local>,
        _end: DateTime<Local>,
    ) -> Result<u64, SensorError> {
        Ok(self
            .read()?
            .get(&start.date_naive())
            .copied()
            .unwrap_or(0))
    }

    fn changes(&self) -> Option<broadcast::Receiver<SensorEvent>> {
        None
    }
}
