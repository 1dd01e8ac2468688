//! HTTP transport against a catalog server
//!
//! Endpoints: `GET /meta`, `GET /filesmeta`, `GET /files/{path}`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use patchsync_core::{FileListing, SnapshotSummary};

use crate::{Remote, Result, TransportError, write_download};

/// Remote catalog reached over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base: Url,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Create a remote for the given backend base URL
    ///
    /// # Errors
    /// Returns an error if the URL does not parse or cannot carry a path
    pub fn new(backend: &str) -> Result<Self> {
        let base = Url::parse(backend).map_err(|e| TransportError::InvalidUrl {
            url: backend.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl {
                url: backend.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("patchsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { base, client })
    }

    /// Build an endpoint URL, percent-encoding each segment
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl {
                url: self.base.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        debug!("GET {url}");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.endpoint([endpoint])?;
        let body = self.get(&url).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| TransportError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn summary(&self) -> Result<SnapshotSummary> {
        self.get_json("meta").await
    }

    async fn listing(&self) -> Result<FileListing> {
        self.get_json("filesmeta").await
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64> {
        let url = self.endpoint(std::iter::once("files").chain(path.split('/')))?;
        let response = self.get(&url).await?;
        write_download(dest, response.bytes_stream()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_on_bare_host() {
        let remote = HttpRemote::new("http://localhost:3000").unwrap();
        assert_eq!(
            remote.endpoint(["meta"]).unwrap().as_str(),
            "http://localhost:3000/meta"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let remote = HttpRemote::new("http://example.com/patches/").unwrap();
        assert_eq!(
            remote.endpoint(["filesmeta"]).unwrap().as_str(),
            "http://example.com/patches/filesmeta"
        );
    }

    #[test]
    fn test_file_segments_are_encoded() {
        let remote = HttpRemote::new("http://localhost:3000").unwrap();
        let url = remote
            .endpoint(std::iter::once("files").chain("data/my file#1.pak".split('/')))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/files/data/my%20file%231.pak"
        );
    }

    #[test]
    fn test_rejects_invalid_backend() {
        assert!(matches!(
            HttpRemote::new("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpRemote::new("mailto:someone@example.com"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
