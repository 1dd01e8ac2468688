//! Local directory transport
//!
//! This module provides a `LocalRemote` that answers catalog requests
//! straight from a directory on the local filesystem, without a server.
//! Useful for testing and for syncing from a mounted share.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use patchsync_core::snapshot::resolve_relative;
use patchsync_core::{FileListing, Scanner, Snapshot, SnapshotSummary};

use crate::{Remote, Result, TransportError, write_download};

/// Remote backed by a local directory (rescanned on every request)
#[derive(Debug, Clone)]
pub struct LocalRemote {
    root: PathBuf,
}

impl LocalRemote {
    /// Create a new local remote serving the given root directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let scanner = Scanner::new(&self.root);
        tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(std::io::Error::other)?
            .map_err(|e| TransportError::Io(std::io::Error::other(format!("{e:#}"))))
    }
}

#[async_trait]
impl Remote for LocalRemote {
    async fn summary(&self) -> Result<SnapshotSummary> {
        Ok(self.snapshot().await?.summary())
    }

    async fn listing(&self) -> Result<FileListing> {
        Ok(self.snapshot().await?.listing())
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64> {
        let source = resolve_relative(&self.root, path)
            .ok_or_else(|| TransportError::InvalidPath(path.to_string()))?;

        let data = match tokio::fs::read(&source).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::Status {
                    url: source.display().to_string(),
                    status: 404,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let body = stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(data)) });
        write_download(dest, body).await
    }
}
