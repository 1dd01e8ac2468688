//! patchsync-transport: Remote catalog access
//!
//! The [`Remote`] trait is what the client orchestrator talks to. Two
//! implementations are provided: [`HttpRemote`] for a catalog server and
//! [`LocalRemote`] for a directory on the local filesystem.

pub mod http;
pub mod local;
pub mod write;

use std::path::Path;

use async_trait::async_trait;

use patchsync_core::{FileListing, SnapshotSummary};

pub use http::HttpRemote;
pub use local::LocalRemote;
pub use write::write_download;

/// Transport failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Connection or protocol failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote answered with a body that does not parse
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A listing named a path that is not plain relative
    #[error("path {0:?} is not a plain relative path")]
    InvalidPath(String),
}

impl TransportError {
    /// The HTTP status attached to a [`TransportError::Status`] failure
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T, E = TransportError> = std::result::Result<T, E>;

/// A source of the authoritative snapshot and its files
#[async_trait]
pub trait Remote: Send + Sync + 'static {
    /// Fetch the `{ hash, totalSize }` summary
    async fn summary(&self) -> Result<SnapshotSummary>;

    /// Fetch the per-file fingerprint list
    async fn listing(&self) -> Result<FileListing>;

    /// Fetch one file by relative path into a newly created file at `dest`,
    /// returning the number of bytes written
    async fn download(&self, path: &str, dest: &Path) -> Result<u64>;
}
