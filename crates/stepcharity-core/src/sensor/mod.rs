//! Step sensor capability layer.
//!
//! Two platform families sit behind [`StepSensor`]:
//!
//! - [`PedometerSensor`]: a cumulative counter queried over a time range,
//!   with change events.
//! - [`HealthStoreSensor`]: a health aggregator holding discrete step
//!   samples that are summed client-side. Poll only.
//!
//! The variant is chosen once, at construction. [`CapabilityGate`] turns the
//! sensor's availability/permission answers into terminal capability states.

mod health;
mod pedometer;

pub use health::{HealthStoreSensor, MemorySamples, SampleFile, SampleProvider, StepSample};
pub use pedometer::{
    CounterDevice, CounterFile, ManualCounter, PedometerSensor, RUNTIME_PERMISSION_API_LEVEL,
};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{CapabilityError, SensorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Pedometer,
    HealthStore,
}

/// Notification that the platform counter moved. Carries no count: the
/// receiver re-queries through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorEvent {
    pub at: DateTime<Local>,
}

/// A platform step sensor.
#[async_trait]
pub trait StepSensor: Send + Sync {
    fn kind(&self) -> SensorKind;

    async fn is_available(&self) -> Result<bool, SensorError>;

    async fn request_permission(&self) -> Result<PermissionStatus, SensorError>;

    async fn check_permission(&self) -> Result<PermissionStatus, SensorError>;

    /// Steps recorded in `[start, end)`.
    async fn steps_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64, SensorError>;

    /// Change-event stream, if the platform pushes updates.
    fn watch(&self) -> Option<broadcast::Receiver<SensorEvent>> {
        None
    }
}

/// Availability and authorization checks for a sensor.
///
/// Errors from the platform collapse to "unavailable"/"denied" with a
/// warning; denial is a state, not a failure.
#[derive(Clone)]
pub struct CapabilityGate {
    sensor: Arc<dyn StepSensor>,
}

impl CapabilityGate {
    pub fn new(sensor: Arc<dyn StepSensor>) -> Self {
        Self { sensor }
    }

    pub fn sensor(&self) -> &Arc<dyn StepSensor> {
        &self.sensor
    }

    pub async fn is_available(&self) -> bool {
        match self.sensor.is_available().await {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!(error = %e, "error checking step sensor availability");
                false
            }
        }
    }

    pub async fn request_permission(&self) -> PermissionStatus {
        match self.sensor.request_permission().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "error requesting step sensor permission");
                PermissionStatus::Denied
            }
        }
    }

    pub async fn check_permission(&self) -> PermissionStatus {
        match self.sensor.check_permission().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "error checking step sensor permission");
                PermissionStatus::Denied
            }
        }
    }

    /// Checks availability, then permission, requesting it once if missing.
    ///
    /// # Errors
    /// Returns the terminal capability state the caller must display.
    pub async fn authorize(&self) -> Result<(), CapabilityError> {
        if !self.is_available().await {
            return Err(CapabilityError::Unavailable);
        }
        if self.check_permission().await.is_granted() {
            return Ok(());
        }
        if self.request_permission().await.is_granted() {
            tracing::info!(kind = ?self.sensor.kind(), "step sensor permission granted");
            Ok(())
        } else {
            Err(CapabilityError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(counter: Arc<ManualCounter>, api_level: u32) -> CapabilityGate {
        CapabilityGate::new(Arc::new(PedometerSensor::new(counter, api_level)))
    }

    #[tokio::test]
    async fn test_missing_sensor_is_unavailable() {
        let counter = Arc::new(ManualCounter::new());
        counter.set_present(false);
        let gate = gate(counter, 34);
        assert_eq!(gate.authorize().await, Err(CapabilityError::Unavailable));
    }

    #[tokio::test]
    async fn test_permission_requested_once_when_missing() {
        let counter = Arc::new(ManualCounter::new());
        counter.set_permission(PermissionStatus::Denied);
        counter.set_grant_on_request(true);
        let gate = gate(counter.clone(), 34);

        assert_eq!(gate.check_permission().await, PermissionStatus::Denied);
        assert_eq!(gate.authorize().await, Ok(()));
        assert_eq!(counter.permission_requests(), 1);
    }

    #[tokio::test]
    async fn test_refused_request_is_terminal_denial() {
        let counter = Arc::new(ManualCounter::new());
        counter.set_permission(PermissionStatus::Denied);
        counter.set_grant_on_request(false);
        let gate = gate(counter, 34);
        assert_eq!(gate.authorize().await, Err(CapabilityError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_health_store_without_export_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SampleFile::new(dir.path().join("missing.json")));
        let gate = CapabilityGate::new(Arc::new(HealthStoreSensor::new(provider)));
        assert_eq!(gate.authorize().await, Err(CapabilityError::Unavailable));
    }
}
