//! Places a mirror map can be loaded from.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{MirrorError, Result};
use super::map::MirrorMap;

/// Public mirror list maintained by DaoCloud, fetched through a GitHub proxy.
pub const DEFAULT_MIRROR_LIST_URL: &str = "https://mirror.ghproxy.com/https://raw.githubusercontent.com/DaoCloud/public-image-mirror/main/domain.txt";

/// Where the current cache generation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOrigin {
    File(PathBuf),
    Url(String),
    Default,
}

impl fmt::Display for MapOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapOrigin::File(path) => write!(f, "file {}", path.display()),
            MapOrigin::Url(url) => write!(f, "url {}", url),
            MapOrigin::Default => write!(f, "built-in defaults"),
        }
    }
}

/// A source of `domain=mirror` mappings.
///
/// Sources are tried in order by the cache; the first one that returns a
/// non-empty map wins.
#[async_trait]
pub trait MappingSource: Send + Sync {
    fn origin(&self) -> MapOrigin;

    async fn fetch(&self) -> Result<MirrorMap>;
}

/// Mapping file on local disk (typically a mounted ConfigMap).
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MappingSource for FileSource {
    fn origin(&self) -> MapOrigin {
        MapOrigin::File(self.path.clone())
    }

    async fn fetch(&self) -> Result<MirrorMap> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| MirrorError::Io {
                path: self.path.clone(),
                source,
            })?;
        non_empty(MirrorMap::parse(&text), &self.origin())
    }
}

/// Mapping list served over HTTP(S).
pub struct UrlSource {
    url: String,
    client: reqwest::Client,
}

impl UrlSource {
    /// `timeout` bounds the whole request, body included. Zero means no timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl MappingSource for UrlSource {
    fn origin(&self) -> MapOrigin {
        MapOrigin::Url(self.url.clone())
    }

    async fn fetch(&self) -> Result<MirrorMap> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(MirrorError::Status {
                url: self.url.clone(),
                status: response.status(),
            });
        }

        let text = response.text().await?;
        non_empty(MirrorMap::parse(&text), &self.origin())
    }
}

fn non_empty(map: MirrorMap, origin: &MapOrigin) -> Result<MirrorMap> {
    if map.is_empty() {
        return Err(MirrorError::Empty(origin.to_string()));
    }
    Ok(map)
}
