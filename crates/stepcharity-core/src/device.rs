// Device identity for ledger attribution
// Format: "stepcharity-<uuid>"

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

const DEVICE_ID_FILE: &str = "device_id.txt";
const DEVICE_ID_PREFIX: &str = "stepcharity-";

/// Source of a stable per-install device id.
pub trait DeviceIdentity: Send + Sync {
    /// `None` when no id can be read or created.
    fn device_id(&self) -> Option<String>;
}

/// Device id persisted as a single line in `device_id.txt`.
pub struct FileDeviceIdentity {
    dir: PathBuf,
}

impl FileDeviceIdentity {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(DEVICE_ID_FILE)
    }
}

impl DeviceIdentity for FileDeviceIdentity {
    fn device_id(&self) -> Option<String> {
        match get_or_create_device_id_at(&self.dir) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path().display(), "device id unavailable");
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum DeviceIdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid device ID format: {0}")]
    InvalidFormat(String),
}

fn is_well_formed(device_id: &str) -> bool {
    device_id
        .strip_prefix(DEVICE_ID_PREFIX)
        .is_some_and(|uuid| Uuid::parse_str(uuid).is_ok())
}

/// Read the id from `dir`, creating it on first use. An existing file with
/// a malformed id is left untouched.
fn get_or_create_device_id_at(dir: &Path) -> Result<String, DeviceIdError> {
    let path = dir.join(DEVICE_ID_FILE);

    if path.exists() {
        let device_id = fs::read_to_string(&path)?.trim().to_string();
        if is_well_formed(&device_id) {
            return Ok(device_id);
        }
        return Err(DeviceIdError::InvalidFormat(device_id));
    }

    let device_id = format!("{DEVICE_ID_PREFIX}{}", Uuid::new_v4());
    fs::create_dir_all(dir)?;
    let mut file = fs::File::create(&path)?;
    writeln!(file, "{device_id}")?;
    tracing::info!(%device_id, "created device id");

    Ok(device_id)
}
