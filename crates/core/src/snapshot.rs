//! Snapshot: A point-in-time, fingerprinted view of a file tree

use std::path::{Component, Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Fingerprint of one file's content at scan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Content hash (MD5)
    pub hash: ContentHash,
    /// Relative path from the scan root, `/`-separated
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// A snapshot of a file tree at a point in time
///
/// File order is the scan order and is part of the aggregate hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub files: Vec<FileFingerprint>,
    pub aggregate: ContentHash,
    pub total_size: u64,
}

/// The `{ hash, totalSize }` summary served at `/meta` and persisted locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub hash: ContentHash,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
}

impl SnapshotSummary {
    /// Whether two summaries describe the same tree state
    #[must_use]
    pub fn is_same_state(&self, other: &Self) -> bool {
        self.hash == other.hash && self.total_size == other.total_size
    }
}

/// The per-file list served at `/filesmeta`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<FileFingerprint>,
}

impl FileListing {
    /// Sum of declared file sizes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Digest over the ordered `(path, hex hash, size as u64 LE)` triples
#[must_use]
pub fn aggregate_hash(files: &[FileFingerprint]) -> ContentHash {
    let mut hasher = Md5::new();
    for file in files {
        hasher.update(file.path.as_bytes());
        hasher.update(file.hash.to_hex().as_bytes());
        hasher.update(file.size.to_le_bytes());
    }
    ContentHash::from_raw(hasher.finalize().into())
}

impl Snapshot {
    /// Build a snapshot from fingerprints in scan order
    #[must_use]
    pub fn from_files(files: Vec<FileFingerprint>) -> Self {
        let aggregate = aggregate_hash(&files);
        let total_size = files.iter().map(|f| f.size).sum();
        Self {
            files,
            aggregate,
            total_size,
        }
    }

    /// Create an empty snapshot
    #[must_use]
    pub fn empty() -> Self {
        Self::from_files(Vec::new())
    }

    /// Get the number of files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            hash: self.aggregate,
            total_size: self.total_size,
        }
    }

    #[must_use]
    pub fn listing(&self) -> FileListing {
        FileListing {
            files: self.files.clone(),
        }
    }
}

/// Convert a path relative to the scan root into its `/`-separated form
///
/// Returns `None` for non-UTF-8 paths or paths that are not plain relative.
#[must_use]
pub fn to_slash_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Resolve a `/`-separated relative path from a listing under `root`
///
/// Rejects anything that could escape the root: empty, `.` or `..`
/// segments, backslashes, and absolute or prefixed components.
#[must_use]
pub fn resolve_relative(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => resolved.push(part),
            _ => return None,
        }
    }
    Some(resolved)
}
