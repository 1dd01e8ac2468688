//! Cached catalog of the served tree
//!
//! The summary and listing are serialized once per rebuild and handed out as
//! shared bytes. A rebuild swaps both under one write lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use parking_lot::RwLock;
use tracing::{info, warn};

use patchsync_core::record::write_atomic;
use patchsync_core::{Scanner, Snapshot, SnapshotSummary};

/// Persisted copy of the summary
pub const META_FILE: &str = "meta.json";
/// Persisted copy of the listing
pub const FILES_META_FILE: &str = "filesmeta.json";

/// One published catalog generation
#[derive(Debug)]
pub struct Published {
    pub summary: SnapshotSummary,
    pub summary_json: Bytes,
    pub listing_json: Bytes,
    pub files: usize,
}

impl Published {
    fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let summary = snapshot.summary();
        let summary_json = serde_json::to_vec(&summary)?;
        let listing_json = serde_json::to_vec(&snapshot.listing())?;
        Ok(Self {
            summary,
            summary_json: Bytes::from(summary_json),
            listing_json: Bytes::from(listing_json),
            files: snapshot.len(),
        })
    }
}

pub struct Catalog {
    root: PathBuf,
    persist_dir: Option<PathBuf>,
    current: RwLock<Option<Arc<Published>>>,
}

impl Catalog {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, persist_dir: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            persist_dir,
            current: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    /// Rescan the root and publish the result
    ///
    /// On failure the previous generation stays published. A persist
    /// directory inside the root is not part of the catalog.
    pub fn rebuild(&self) -> Result<Arc<Published>> {
        let mut scanner = Scanner::new(&self.root);
        if let Some(dir) = &self.persist_dir {
            scanner = scanner.exclude(dir);
        }
        let snapshot = scanner
            .scan()
            .wrap_err_with(|| format!("failed to scan {}", self.root.display()))?;
        let published = Arc::new(Published::from_snapshot(&snapshot)?);

        *self.current.write() = Some(Arc::clone(&published));
        info!(
            "Published catalog: {} files, {} bytes, hash {}",
            published.files, published.summary.total_size, published.summary.hash
        );

        if let Some(dir) = &self.persist_dir {
            if let Err(e) = persist(dir, &published) {
                warn!("Failed to persist catalog to {}: {e:#}", dir.display());
            }
        }
        Ok(published)
    }

    /// The current generation, if a rebuild has succeeded
    #[must_use]
    pub fn published(&self) -> Option<Arc<Published>> {
        self.current.read().clone()
    }

    #[must_use]
    pub fn summary_json(&self) -> Option<Bytes> {
        self.published().map(|p| p.summary_json.clone())
    }

    #[must_use]
    pub fn listing_json(&self) -> Option<Bytes> {
        self.published().map(|p| p.listing_json.clone())
    }
}

fn persist(dir: &Path, published: &Published) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_atomic(&dir.join(META_FILE), &published.summary_json)?;
    write_atomic(&dir.join(FILES_META_FILE), &published.listing_json)?;
    Ok(())
}
