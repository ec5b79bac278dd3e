mod config;
pub mod database;

pub use config::{BackendConfig, BackendKind, Config, SensorConfig, SensorKindConfig, TrackingConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `STEPCHARITY_DATA_DIR` wins when set. Otherwise `~/.config/stepcharity[-dev]/`,
/// with STEPCHARITY_ENV=dev selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STEPCHARITY_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("STEPCHARITY_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("stepcharity-dev")
            } else {
                base_dir.join("stepcharity")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
