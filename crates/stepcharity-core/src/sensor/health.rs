//! Health-aggregator sensor family: discrete samples summed client-side.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::{PermissionStatus, SensorKind, StepSensor};
use crate::error::SensorError;

/// One step record as stored by a health aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: u64,
}

/// Raw health-aggregator API.
#[async_trait]
pub trait SampleProvider: Send + Sync {
    async fn is_available(&self) -> Result<bool, SensorError>;

    /// One-time authorization against the aggregator.
    async fn authorize(&self) -> Result<bool, SensorError>;

    /// Whether access is currently granted, without prompting.
    async fn is_authorized(&self) -> Result<bool, SensorError>;

    /// Samples overlapping `[start, end)`.
    async fn samples(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StepSample>, SensorError>;
}

/// Health-aggregator based step sensor. Authorization state lives in the
/// provider, so a fresh process sees a grant made by an earlier one.
pub struct HealthStoreSensor {
    provider: Arc<dyn SampleProvider>,
}

impl HealthStoreSensor {
    pub fn new(provider: Arc<dyn SampleProvider>) -> Self {
        Self { provider }
    }
}

fn permission(granted: bool) -> PermissionStatus {
    if granted {
        PermissionStatus::Granted
    } else {
        PermissionStatus::Denied
    }
}

/// Sum of samples whose start falls in `[start, end)`.
fn sum_samples(samples: &[StepSample], start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    samples
        .iter()
        .filter(|s| s.start >= start && s.start < end)
        .map(|s| s.count)
        .sum()
}

#[async_trait]
impl StepSensor for HealthStoreSensor {
    fn kind(&self) -> SensorKind {
        SensorKind::HealthStore
    }

    async fn is_available(&self) -> Result<bool, SensorError> {
        self.provider.is_available().await
    }

    async fn request_permission(&self) -> Result<PermissionStatus, SensorError> {
        Ok(permission(self.provider.authorize().await?))
    }

    async fn check_permission(&self) -> Result<PermissionStatus, SensorError> {
        Ok(permission(self.provider.is_authorized().await?))
    }

    async fn steps_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64, SensorError> {
        if end <= start {
            return Ok(0);
        }
        let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
        let samples = self.provider.samples(start, end).await?;
        Ok(sum_samples(&samples, start, end))
    }
}

/// Health export stored as a JSON array of samples. Re-read on every query,
/// so samples appended by an exporter show up on the next poll.
#[derive(Debug, Clone)]
pub struct SampleFile {
    path: PathBuf,
}

impl SampleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<StepSample>, SensorError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SensorError::QueryFailed(format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| SensorError::QueryFailed(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl SampleProvider for SampleFile {
    async fn is_available(&self) -> Result<bool, SensorError> {
        Ok(self.path.is_file())
    }

    async fn authorize(&self) -> Result<bool, SensorError> {
        self.is_authorized().await
    }

    /// The export exists; there is nothing further to grant.
    async fn is_authorized(&self) -> Result<bool, SensorError> {
        Ok(std::fs::metadata(&self.path).is_ok())
    }

    async fn samples(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StepSample>, SensorError> {
        Ok(self
            .read()?
            .into_iter()
            .filter(|s| s.end > start && s.start < end)
            .collect())
    }
}

/// In-memory provider for tests. Starts unauthorized.
#[derive(Debug, Default)]
pub struct MemorySamples {
    samples: Mutex<Vec<StepSample>>,
    authorized: AtomicBool,
}

impl MemorySamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: StepSample) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(sample);
        }
    }
}

#[async_trait]
impl SampleProvider for MemorySamples {
    async fn is_available(&self) -> Result<bool, SensorError> {
        Ok(true)
    }

    async fn authorize(&self) -> Result<bool, SensorError> {
        self.authorized.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn is_authorized(&self) -> Result<bool, SensorError> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn samples(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StepSample>, SensorError> {
        let samples = self
            .samples
            .lock()
            .map_err(|_| SensorError::QueryFailed("sample buffer poisoned".into()))?;
        Ok(samples
            .iter()
            .filter(|s| s.end > start && s.start < end)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn sample(h: u32, count: u64) -> StepSample {
        StepSample {
            start: at(h, 0),
            end: at(h, 30),
            count,
        }
    }

    #[test]
    fn test_samples_are_attributed_by_start() {
        let samples = vec![sample(8, 100), sample(9, 250), sample(10, 40)];
        assert_eq!(sum_samples(&samples, at(8, 0), at(10, 0)), 350);
        assert_eq!(sum_samples(&samples, at(9, 15), at(23, 0)), 40);
    }

    #[tokio::test]
    async fn test_permission_follows_authorization() {
        let sensor = HealthStoreSensor::new(Arc::new(MemorySamples::new()));
        assert_eq!(sensor.check_permission().await, Ok(PermissionStatus::Denied));
        assert_eq!(sensor.request_permission().await, Ok(PermissionStatus::Granted));
        assert_eq!(sensor.check_permission().await, Ok(PermissionStatus::Granted));
    }

    #[tokio::test]
    async fn test_sample_file_permission_survives_new_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        let sensor = HealthStoreSensor::new(Arc::new(SampleFile::new(&path)));
        assert_eq!(sensor.check_permission().await, Ok(PermissionStatus::Denied));

        std::fs::write(&path, serde_json::to_string(&vec![sample(8, 42)]).unwrap()).unwrap();
        let fresh = HealthStoreSensor::new(Arc::new(SampleFile::new(&path)));
        assert_eq!(fresh.check_permission().await, Ok(PermissionStatus::Granted));
    }

    #[tokio::test]
    async fn test_sample_file_is_reread_each_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        std::fs::write(&path, serde_json::to_string(&vec![sample(8, 100)]).unwrap()).unwrap();

        let file = SampleFile::new(&path);
        assert_eq!(file.samples(at(0, 0), at(23, 0)).await.unwrap().len(), 1);

        std::fs::write(
            &path,
            serde_json::to_string(&vec![sample(8, 100), sample(9, 5)]).unwrap(),
        )
        .unwrap();
        assert_eq!(file.samples(at(0, 0), at(23, 0)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_query_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        std::fs::write(&path, "{not json").unwrap();
        let file = SampleFile::new(&path);
        assert!(matches!(
            file.samples(at(0, 0), at(1, 0)).await,
            Err(SensorError::QueryFailed(_))
        ));
    }
}
