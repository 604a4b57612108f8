//! Test harness: a mock release host plus an installed executable.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xupdater::{platform_tag, ProviderKind, SwapStrategy, UpdaterConfig};
use zip::write::SimpleFileOptions;

/// Repository every test pretends to update from.
pub const REPO_URL: &str = "https://github.com/acme/tool";

/// Base executable name.
pub const NAME: &str = "tool";

/// Release index path served by the mock.
pub const RELEASES_PATH: &str = "/repos/acme/tool/releases";

/// Bytes of the installed executable.
pub const OLD_BINARY: &[u8] = b"#!/bin/sh\necho old\n";

/// Mock GitHub plus a fake installation.
pub struct TestHarness {
    /// Mock API and asset host.
    pub server: MockServer,
    /// Holds the target executable.
    pub install_dir: TempDir,
    /// Staging root so tests can check cleanup.
    pub staging_dir: TempDir,
}

impl TestHarness {
    /// Start the mock server and install the old executable.
    pub async fn setup() -> Self {
        let harness = Self {
            server: MockServer::start().await,
            install_dir: TempDir::new().unwrap(),
            staging_dir: TempDir::new().unwrap(),
        };

        let target = harness.target();
        fs::write(&target, OLD_BINARY).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o750)).unwrap();
        }
        harness
    }

    /// Path of the installed executable.
    pub fn target(&self) -> PathBuf {
        self.install_dir.path().join(NAME)
    }

    /// Archive name published for this platform.
    pub fn archive_name() -> String {
        format!("{NAME}_{}.zip", platform_tag())
    }

    /// Executable entry inside the archive.
    pub fn entry_name() -> String {
        format!("{NAME}_{}{}", platform_tag(), std::env::consts::EXE_SUFFIX)
    }

    /// Download path of the archive for `tag`.
    pub fn asset_path(tag: &str) -> String {
        format!("/download/{tag}/{}", Self::archive_name())
    }

    /// Remote config pointing at the mock server.
    pub fn config(&self, current_version: &str) -> UpdaterConfig {
        let mut config = UpdaterConfig::new(ProviderKind::Remote, REPO_URL, NAME, current_version);
        config.api_base_url = self.server.uri();
        config.target = Some(self.target());
        config.timeout_secs = 10;
        config.swap_strategy = Some(SwapStrategy::RenameOver);
        config
    }

    /// Serve a release index with one release per tag, each with the
    /// platform archive attached.
    pub async fn mount_index(&self, tags: &[&str]) {
        let releases: Vec<_> = tags
            .iter()
            .map(|tag| {
                json!({
                    "tag_name": tag,
                    "draft": false,
                    "prerelease": false,
                    "assets": [{
                        "name": Self::archive_name(),
                        "browser_download_url":
                            format!("{}{}", self.server.uri(), Self::asset_path(tag)),
                    }],
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path(RELEASES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(releases))
            .mount(&self.server)
            .await;
    }

    /// Serve `body` at the archive path for `tag`, expecting `calls` hits.
    pub async fn mount_asset(&self, tag: &str, body: Vec<u8>, calls: u64) {
        Mock::given(method("GET"))
            .and(path(Self::asset_path(tag)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Serve `body` at the archive path for `tag` after `delay`.
    pub async fn mount_slow_asset(&self, tag: &str, body: Vec<u8>, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(Self::asset_path(tag)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Files left in the staging root.
    pub fn staging_entries(&self) -> usize {
        fs::read_dir(self.staging_dir.path()).unwrap().count()
    }
}

/// Build a zip archive in memory from `(name, contents)` pairs.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Read a file's permission mode (unix) for comparisons.
#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}
