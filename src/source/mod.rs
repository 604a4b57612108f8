//! Update candidate sources.
//!
//! A source answers two questions: which version is the latest candidate,
//! and what bytes (or directory) make up that candidate. The three variants
//! form a closed set so dispatch is checked exhaustively at compile time.

mod github;
mod local;

pub use github::{GithubAsset, GithubRelease, GithubSource, RepoSlug};
pub use local::{glob_newest_file, LocalDirSource, ZipGlobSource, VERSION_FILE};

use crate::config::{ProviderKind, UpdaterConfig};
use crate::error::{Error, Result};
use crate::request::UpdateRequest;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Where a resolved candidate can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Archive reachable over HTTP(S).
    Url(String),
    /// Archive on the local filesystem.
    File(PathBuf),
    /// Directory that already holds the unpacked candidate.
    Directory(PathBuf),
}

/// Latest candidate advertised by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Version tag as advertised (may carry a `v` prefix).
    pub version: String,
    /// Where to read the candidate from.
    pub locator: Locator,
}

/// Raw candidate handed to the fetcher.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Archive bytes (zip or tar.gz).
    Archive(Bytes),
    /// Already unpacked candidate directory.
    Directory(PathBuf),
}

/// A pluggable update source.
#[derive(Debug)]
pub enum Source {
    /// Tagged GitHub releases.
    Remote(GithubSource),
    /// Local directory passthrough.
    LocalDir(LocalDirSource),
    /// Newest zip file in a local directory.
    LocalZipGlob(ZipGlobSource),
}

impl Source {
    /// Build the source selected by the request's provider kind.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the location is not valid for the provider
    /// (for example a malformed repository URL).
    pub fn from_config(request: &UpdateRequest, config: &UpdaterConfig) -> Result<Self> {
        let source = match request.provider {
            ProviderKind::Remote => Self::Remote(GithubSource::new(
                &request.location,
                request.archive_name(),
                &config.api_base_url,
                config.channel,
                Duration::from_secs(config.timeout_secs),
            )?),
            ProviderKind::LocalDir => Self::LocalDir(LocalDirSource::new(
                &request.location,
                config.candidate_version.clone(),
            )),
            ProviderKind::LocalZipGlob => Self::LocalZipGlob(ZipGlobSource::new(&request.location)),
        };
        debug!("Selected {} source at {}", request.provider, source.location());
        Ok(source)
    }

    /// Human-readable location (URL or path) for logs.
    #[must_use]
    pub fn location(&self) -> String {
        match self {
            Self::Remote(remote) => remote.repo().web_url(),
            Self::LocalDir(local) => local.path().display().to_string(),
            Self::LocalZipGlob(zip) => zip.pattern(),
        }
    }

    /// Resolve the latest candidate.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the source has no candidate and
    /// `Error::Network` on transport failures.
    pub async fn resolve_latest(&self) -> Result<Release> {
        match self {
            Self::Remote(remote) => remote.resolve_latest().await,
            Self::LocalDir(local) => local.resolve_latest(),
            Self::LocalZipGlob(zip) => zip.resolve_latest(),
        }
    }

    /// Read the candidate for a resolved release.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the candidate disappeared since
    /// resolution, `Error::Network` on download failures.
    pub async fn fetch(&self, release: &Release) -> Result<Payload> {
        match (&release.locator, self) {
            (Locator::Url(url), Self::Remote(remote)) => {
                remote.download(url).await.map(Payload::Archive)
            }
            (Locator::Url(url), _) => Err(Error::Config(format!(
                "local source cannot download {url}"
            ))),
            (Locator::File(path), _) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(Payload::Archive(Bytes::from(bytes))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(
                    format!("archive {} vanished", path.display()),
                )),
                Err(e) => Err(e.into()),
            },
            (Locator::Directory(path), _) => {
                if path.is_dir() {
                    Ok(Payload::Directory(path.clone()))
                } else {
                    Err(Error::NotFound(format!(
                        "candidate directory {} vanished",
                        path.display()
                    )))
                }
            }
        }
    }
}
