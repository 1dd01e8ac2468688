//! Local sync record: the summary of the last completed sync
//!
//! Stores only `{ hash, totalSize }`. Read at the start of a cycle to decide
//! whether anything needs fetching, rewritten at the end of every sync.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::snapshot::SnapshotSummary;

/// Directory under the sync root holding patchsync state
pub const STATE_DIR: &str = ".patchsync";

/// Record file name inside [`STATE_DIR`]
pub const RECORD_FILE: &str = "record.json";

/// Handle to the persisted record file
#[derive(Debug, Clone)]
pub struct LocalSyncRecord {
    path: PathBuf,
}

impl LocalSyncRecord {
    /// Record stored at an explicit path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record stored at the default location under `root`
    #[must_use]
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(STATE_DIR).join(RECORD_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record. A missing or malformed record reads as `None`.
    #[must_use]
    pub fn load(&self) -> Option<SnapshotSummary> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No sync record at {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(
                    "Ignoring malformed sync record {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Atomically replace the record: write a sibling temp file, then rename
    ///
    /// # Errors
    /// Returns an error if the state directory or file cannot be written.
    pub fn save(&self, summary: &SnapshotSummary) -> color_eyre::Result<()> {
        let bytes = serde_json::to_vec(summary)?;
        write_atomic(&self.path, &bytes)
    }
}

/// Write `bytes` to `path` so readers never observe a torn file
///
/// # Errors
/// Returns an error if the parent directory, temp file, or rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> color_eyre::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
