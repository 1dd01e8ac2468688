//! Streaming a download into a new file

use std::path::Path;

use bytes::Bytes;
use futures_util::{Stream, StreamExt as _};
use tokio::fs::File;
use tokio::io::AsyncWriteExt as _;
use tracing::warn;

use crate::{Result, TransportError};

/// Stream `body` into a newly created file at `dest`
///
/// Parent directories are created as needed. On unix the file also gets
/// execute permission so fetched executables can be launched; failing to set
/// it is logged and otherwise ignored.
pub async fn write_download<S, E>(dest: &Path, body: S) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<TransportError>,
{
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(dest).await?;
    if let Err(e) = grant_execute(&file).await {
        warn!("Failed to set execute permission on {}: {e}", dest.display());
    }

    let mut body = std::pin::pin!(body);
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::into)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

#[cfg(unix)]
async fn grant_execute(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    let mut perms = file.metadata().await?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    file.set_permissions(perms).await
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn grant_execute(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tempfile::TempDir;

    fn chunks(
        parts: &[&'static [u8]],
    ) -> stream::Iter<std::vec::IntoIter<std::io::Result<Bytes>>> {
        stream::iter(
            parts
                .iter()
                .map(|&p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a/b/c/file.bin");

        let written = write_download(&dest, chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("file.txt");
        std::fs::write(&dest, "a much longer stale body").unwrap();

        write_download(&dest, chunks(&[b"new"])).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sets_execute_bits() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("game");
        write_download(&dest, chunks(&[b"#!/bin/sh\n"])).await.unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "mode: {mode:o}");
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("broken.bin");
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(std::io::Error::other("connection reset")),
        ]);

        let err = write_download(&dest, body).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)), "{err:?}");
    }
}
