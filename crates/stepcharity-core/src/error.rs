//! Core error types for stepcharity-core.
//!
//! This module defines the error hierarchy using thiserror. Transient sensor
//! and storage faults are normally caught inside the engine and replaced with
//! safe defaults; the types here are what crosses a public boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stepcharity-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Local persistence errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Step sensor errors
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Sensor missing or not authorized
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Remote ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Device identity could not be determined
    #[error("Device ID not available")]
    DeviceIdUnavailable,

    /// No employee is registered for this device
    #[error("No employee registered for device {device_id}")]
    NotRegistered { device_id: String },

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Local persistence errors (SQLite).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Connection mutex was poisoned by a panicking holder
    #[error("Database connection poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors raised by a platform step sensor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// No step sensor on this device
    #[error("Step sensor not available on this device")]
    Unavailable,

    /// Permission missing for the query
    #[error("Step sensor permission not granted")]
    PermissionDenied,

    /// Query against the platform API failed
    #[error("Step query failed: {0}")]
    QueryFailed(String),
}

/// Terminal capability states. Displayed to the user, never retried by the core.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Pedometer not available on this device")]
    Unavailable,

    #[error("Step sensor permission denied. Please enable it in device settings.")]
    PermissionDenied,
}

/// Remote ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed backend response: {0}")]
    Decode(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Global settings are not configured")]
    MissingSettings,

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value
    #[error("{field}: {message}")]
    InvalidValue { field: String, message: String },

    /// Calendar day string could not be parsed
    #[error("Invalid calendar day '{0}', expected YYYY-MM-DD")]
    InvalidDay(String),
}

impl ValidationError {
    pub fn invalid(field: &str, message: &str) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
