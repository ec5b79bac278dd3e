//! Builds the core objects from `config.toml`.

use std::sync::Arc;
use std::time::Duration;

use stepcharity_core::sensor::{
    CounterFile, HealthStoreSensor, PedometerSensor, SampleFile, StepSensor,
};
use stepcharity_core::storage::{data_dir, BackendKind, SensorKindConfig};
use stepcharity_core::{
    Config, CoreError, Database, FileDeviceIdentity, LedgerError, RestLedger, Session,
    SqliteBaselineStore, SqliteLedger, StepEngine, StepLedger, StepTracker, SystemClock,
};

pub struct AppContext {
    pub config: Config,
    pub engine: Arc<StepEngine>,
    pub tracker: StepTracker,
    local: Option<Arc<SqliteLedger>>,
}

impl AppContext {
    pub fn load() -> Result<Self, CoreError> {
        let config = Config::load()?;
        let dir = data_dir()?;
        let db = Arc::new(Database::open_at(&dir.join("stepcharity.db"))?);

        let sensor = build_sensor(&config)?;
        let engine = Arc::new(StepEngine::new(
            sensor,
            Arc::new(SqliteBaselineStore::new(db.clone())),
            Arc::new(SystemClock),
        ));

        let (ledger, local) = match config.backend.kind {
            BackendKind::Local => {
                let local = Arc::new(SqliteLedger::new(db)?);
                (local.clone() as Arc<dyn StepLedger>, Some(local))
            }
            BackendKind::Rest => {
                if config.backend.url.trim().is_empty() {
                    return Err(LedgerError::NotConfigured("backend.url is empty".into()).into());
                }
                let rest = RestLedger::new(
                    config.backend.url.trim(),
                    &config.backend.api_key,
                    Duration::from_secs(config.backend.timeout_secs.max(1)),
                )?;
                (Arc::new(rest) as Arc<dyn StepLedger>, None)
            }
        };

        let tracker = StepTracker::new(
            engine.clone(),
            ledger,
            Arc::new(FileDeviceIdentity::new(dir)),
        );
        Ok(Self {
            config,
            engine,
            tracker,
            local,
        })
    }

    pub fn ledger(&self) -> &Arc<dyn StepLedger> {
        self.tracker.ledger()
    }

    /// The SQLite ledger; write-side admin commands need it.
    pub fn local_ledger(&self) -> Result<&SqliteLedger, CoreError> {
        self.local.as_deref().ok_or_else(|| {
            CoreError::Custom("this command requires backend.kind = \"local\"".into())
        })
    }

    pub async fn session(&self) -> Result<Session, CoreError> {
        self.tracker.resolve_session().await
    }
}

fn build_sensor(config: &Config) -> Result<Arc<dyn StepSensor>, CoreError> {
    let sensor: Arc<dyn StepSensor> = match config.sensor.kind {
        SensorKindConfig::HealthExport => Arc::new(HealthStoreSensor::new(Arc::new(
            SampleFile::new(config.samples_path()?),
        ))),
        SensorKindConfig::Pedometer => Arc::new(PedometerSensor::new(
            Arc::new(CounterFile::new(config.counter_path()?)),
            config.sensor.api_level,
        )),
    };
    tracing::debug!(kind = ?sensor.kind(), "step sensor selected");
    Ok(sensor)
}
