//! patchsync configuration file parsing (patchsync.toml)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::record::LocalSyncRecord;

/// Config file name
pub const CONFIG_FILE: &str = "patchsync.toml";

/// Default backend the client syncs from
pub const DEFAULT_BACKEND: &str = "http://localhost:3000";

/// Default number of simultaneous downloads
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 10;

/// Top-level configuration with one table per side
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatchsyncConfig {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

/// Client-side sync settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the catalog server
    pub backend: String,
    /// Local root the remote file set is mirrored into
    pub root: PathBuf,
    /// Where the sync record lives (default: `<root>/.patchsync/record.json`)
    pub record_path: Option<PathBuf>,
    /// Download concurrency ceiling
    pub max_concurrent_downloads: usize,
    /// How often progress is sampled while downloading
    pub progress_interval_ms: u64,
    /// Rebuild the sync record from disk before checking for updates
    pub refresh_record: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            root: PathBuf::from("."),
            record_path: None,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            progress_interval_ms: 100,
            refresh_record: true,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    #[must_use]
    pub fn record(&self) -> LocalSyncRecord {
        match &self.record_path {
            Some(path) => LocalSyncRecord::new(path),
            None => LocalSyncRecord::in_root(&self.root),
        }
    }
}

/// Server-side catalog settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory whose files are fingerprinted and served
    pub root: PathBuf,
    /// Listen address
    pub bind: SocketAddr,
    /// Quiet period after the last file-system event before rescanning
    pub debounce_ms: u64,
    /// Also write `meta.json` and `filesmeta.json` here after each rescan
    pub persist_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./files"),
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            debounce_ms: 500,
            persist_dir: None,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl PatchsyncConfig {
    /// Load config from a file path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
