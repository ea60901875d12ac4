//! Persisted repositories shared by the pipeline: delivered fingerprints,
//! per-source health and the rotation history.
//!
//! All three tolerate missing or corrupt files (cold start = empty) and never
//! abort the cycle on a failed write; failures are logged and the in-memory
//! state stays authoritative for the rest of the run.

pub mod fingerprints;
pub mod health;
pub mod rotation;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use fingerprints::FingerprintStore;
pub use health::{HealthRecord, SourceHealth};
pub use rotation::RotationHistory;

pub const FINGERPRINTS_FILE: &str = "posted_fingerprints.txt";
pub const HEALTH_FILE: &str = "source_health.json";
pub const ROTATION_FILE: &str = "rotation_history.json";

/// Write via a sibling temp file + rename so readers never see a torn file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming onto {}", path.display()))?;
    Ok(())
}

/// The three stores opened from one state directory.
pub struct StateStores {
    pub fingerprints: FingerprintStore,
    pub health: SourceHealth,
    pub rotation: RotationHistory,
}

impl StateStores {
    pub fn open(dir: &Path, fingerprint_retention: usize, rotation_capacity: usize) -> Self {
        Self {
            fingerprints: FingerprintStore::open(dir.join(FINGERPRINTS_FILE), fingerprint_retention),
            health: SourceHealth::open(dir.join(HEALTH_FILE)),
            rotation: RotationHistory::open(dir.join(ROTATION_FILE), rotation_capacity),
        }
    }
}
