//! GitHub release source.

use crate::config::ReleaseChannel;
use crate::error::{Error, Result};
use crate::source::{Locator, Release};
use crate::version::{highest, parse_version};
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("xupdater/", env!("CARGO_PKG_VERSION"));

/// Releases requested per index page. One page is enough for a latest-tag
/// lookup; older releases are never candidates.
const RELEASES_PER_PAGE: u32 = 100;

/// Release entry from the GitHub releases API.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    /// Git tag, usually `vX.Y.Z`.
    pub tag_name: String,
    /// Unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Marked as a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Attached files.
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

/// File attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

/// `owner/repo` pair parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepoSlug {
    /// Browser URL of the repository.
    #[must_use]
    pub fn web_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoSlug {
    type Err = Error;

    /// Accepts `https://github.com/o/r`, `github.com/o/r.git` or `o/r`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches('/');
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let path = without_scheme
            .strip_prefix("www.github.com/")
            .or_else(|| without_scheme.strip_prefix("github.com/"))
            .unwrap_or(without_scheme);

        let mut parts = path.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                let repo = repo.strip_suffix(".git").unwrap_or(repo);
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(Error::Config(format!(
                "'{s}' is not a GitHub repository URL (expected https://github.com/<owner>/<repo>)"
            ))),
        }
    }
}

/// Resolves and downloads release archives from GitHub.
#[derive(Debug)]
pub struct GithubSource {
    /// Repository to query.
    repo: RepoSlug,
    /// Archive file name attached to each release.
    archive_name: String,
    /// API base URL (overridable for GitHub Enterprise and tests).
    api_base_url: String,
    /// Release channel to track.
    channel: ReleaseChannel,
    client: reqwest::Client,
}

impl GithubSource {
    /// Create a source for a repository URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the URL is not a GitHub repository, or
    /// `Error::Network` if the HTTP client cannot be built.
    pub fn new(
        repository_url: &str,
        archive_name: impl Into<String>,
        api_base_url: &str,
        channel: ReleaseChannel,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            repo: repository_url.parse()?,
            archive_name: archive_name.into(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            channel,
            client,
        })
    }

    /// The tracked repository.
    #[must_use]
    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    /// Release index URL.
    #[must_use]
    pub fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases?per_page={RELEASES_PER_PAGE}",
            self.api_base_url, self.repo.owner, self.repo.repo
        )
    }

    /// Fetch the release index.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the repository does not exist and
    /// `Error::Network` on transport failures or unexpected statuses.
    pub async fn list_releases(&self) -> Result<Vec<GithubRelease>> {
        let url = self.releases_url();
        debug!("Fetching release index from {url}");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!(
                "repository {} has no release index",
                self.repo
            ))),
            status => Err(Error::Network(format!(
                "release index {url} returned {status}"
            ))),
        }
    }

    /// Resolve the newest release on the tracked channel.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no eligible release exists.
    pub async fn resolve_latest(&self) -> Result<Release> {
        let releases = self.list_releases().await?;
        let release = select_release(&releases, self.channel).ok_or_else(|| {
            Error::NotFound(format!("no {:?} releases in {}", self.channel, self.repo))
        })?;

        let url = self.download_url(release);
        info!(tag = %release.tag_name, url = %url, "resolved latest release");

        Ok(Release {
            version: release.tag_name.clone(),
            locator: Locator::Url(url),
        })
    }

    /// Download URL of this platform's archive on a release.
    ///
    /// Uses the attached asset when listed, otherwise the conventional
    /// `releases/download/<tag>/<archive>` path.
    #[must_use]
    pub fn download_url(&self, release: &GithubRelease) -> String {
        release
            .assets
            .iter()
            .find(|asset| asset.name == self.archive_name)
            .map_or_else(
                || {
                    format!(
                        "{}/releases/download/{}/{}",
                        self.repo.web_url(),
                        release.tag_name,
                        self.archive_name
                    )
                },
                |asset| asset.browser_download_url.clone(),
            )
    }

    /// Download an archive, streaming the body chunk by chunk.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` on HTTP 404 and `Error::Network` otherwise.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        debug!("Downloading {url}");
        let mut response = self.client.get(url).send().await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(Error::NotFound(format!(
                    "archive {} not attached at {url}",
                    self.archive_name
                )));
            }
            status => {
                return Err(Error::Network(format!("download {url} returned {status}")));
            }
        }

        let capacity = response
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let mut body = BytesMut::with_capacity(capacity);
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
        }

        debug!("Downloaded {} bytes", body.len());
        Ok(body.freeze())
    }
}

/// Pick the release to install from an index.
///
/// Drafts never qualify; pre-releases only on the beta channel. The highest
/// semantic version wins; when no tag parses, index order (newest first)
/// decides.
fn select_release(releases: &[GithubRelease], channel: ReleaseChannel) -> Option<&GithubRelease> {
    let eligible: Vec<&GithubRelease> = releases
        .iter()
        .filter(|r| !r.draft)
        .filter(|r| match channel {
            ReleaseChannel::Beta => true,
            ReleaseChannel::Stable => {
                !r.prerelease
                    && parse_version(&r.tag_name).map_or(true, |v| v.pre.is_empty())
            }
        })
        .collect();

    if let Some(tag) = highest(eligible.iter().map(|r| r.tag_name.as_str())) {
        return eligible.into_iter().find(|r| r.tag_name == tag);
    }

    let first = eligible.first().copied();
    if let Some(release) = first {
        warn!(
            "No semver tags in release index, using newest listed: {}",
            release.tag_name
        );
    }
    first
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn release(tag: &str, prerelease: bool) -> GithubRelease {
        GithubRelease {
            tag_name: tag.to_string(),
            draft: false,
            prerelease,
            assets: Vec::new(),
        }
    }

    fn source(channel: ReleaseChannel) -> GithubSource {
        GithubSource::new(
            "https://github.com/acme/tool",
            "tool_linux_amd64.zip",
            "https://api.github.com/",
            channel,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_repo_slug_forms() {
        let expected = RepoSlug {
            owner: "acme".to_string(),
            repo: "tool".to_string(),
        };
        for input in [
            "https://github.com/acme/tool",
            "https://github.com/acme/tool/",
            "github.com/acme/tool.git",
            "http://www.github.com/acme/tool",
            "acme/tool",
        ] {
            assert_eq!(input.parse::<RepoSlug>().unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn test_repo_slug_rejects_garbage() {
        for input in ["", "acme", "https://github.com/acme", "a/b/c/d"] {
            assert!(input.parse::<RepoSlug>().is_err(), "{input} should fail");
        }
    }

    #[test]
    fn test_releases_url() {
        let src = source(ReleaseChannel::Stable);
        assert_eq!(
            src.releases_url(),
            "https://api.github.com/repos/acme/tool/releases?per_page=100"
        );
    }

    #[test]
    fn test_select_highest_semver() {
        let releases = vec![
            release("v1.2.0", false),
            release("v1.10.0", false),
            release("v1.9.0", false),
        ];
        let picked = select_release(&releases, ReleaseChannel::Stable).unwrap();
        assert_eq!(picked.tag_name, "v1.10.0");
    }

    #[test]
    fn test_stable_skips_prereleases_and_drafts() {
        let mut draft = release("v3.0.0", false);
        draft.draft = true;
        let releases = vec![
            draft,
            release("v2.0.0", true),
            release("v2.0.0-rc.1", false),
            release("v1.5.0", false),
        ];
        let stable = select_release(&releases, ReleaseChannel::Stable).unwrap();
        assert_eq!(stable.tag_name, "v1.5.0");

        let beta = select_release(&releases, ReleaseChannel::Beta).unwrap();
        assert_eq!(beta.tag_name, "v2.0.0");
    }

    #[test]
    fn test_select_falls_back_to_index_order() {
        let releases = vec![release("nightly-b", false), release("nightly-a", false)];
        let picked = select_release(&releases, ReleaseChannel::Stable).unwrap();
        assert_eq!(picked.tag_name, "nightly-b");
        assert!(select_release(&[], ReleaseChannel::Stable).is_none());
    }

    #[test]
    fn test_download_url_prefers_asset() {
        let src = source(ReleaseChannel::Stable);
        let mut rel = release("v1.2.0", false);
        assert_eq!(
            src.download_url(&rel),
            "https://github.com/acme/tool/releases/download/v1.2.0/tool_linux_amd64.zip"
        );

        rel.assets.push(GithubAsset {
            name: "tool_linux_amd64.zip".to_string(),
            browser_download_url: "https://cdn.example/tool.zip".to_string(),
        });
        assert_eq!(src.download_url(&rel), "https://cdn.example/tool.zip");
    }
}
