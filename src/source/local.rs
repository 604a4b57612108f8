//! Local filesystem sources.

use crate::error::{Error, Result};
use crate::source::{Locator, Release};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Name of the version marker file (in a directory or at an archive root).
pub const VERSION_FILE: &str = "VERSION";

/// A directory that already holds the unpacked candidate.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    path: PathBuf,
    version_marker: Option<String>,
}

impl LocalDirSource {
    /// Create a source for `path`.
    ///
    /// `version_marker` is the candidate's version as supplied by the caller;
    /// when absent the `VERSION` file inside the directory is read instead.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, version_marker: Option<String>) -> Self {
        Self {
            path: path.into(),
            version_marker,
        }
    }

    /// Candidate directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve the candidate version.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the directory is absent or no version
    /// marker is available.
    pub fn resolve_latest(&self) -> Result<Release> {
        if !self.path.is_dir() {
            return Err(Error::NotFound(format!(
                "candidate directory {} does not exist",
                self.path.display()
            )));
        }

        let version = match self.version_marker {
            Some(ref marker) => marker.trim().to_string(),
            None => read_version_file(&self.path.join(VERSION_FILE))?,
        };

        debug!("Local candidate {} at version {version}", self.path.display());
        Ok(Release {
            version,
            locator: Locator::Directory(self.path.clone()),
        })
    }
}

fn read_version_file(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
            "no version marker supplied and {} is missing",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// The newest `*.zip` archive in a directory.
#[derive(Debug, Clone)]
pub struct ZipGlobSource {
    dir: PathBuf,
}

impl ZipGlobSource {
    /// Create a source scanning `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Glob pattern matched against the directory.
    #[must_use]
    pub fn pattern(&self) -> String {
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        format!("{}/*.zip", dir.trim_end_matches('/'))
    }

    /// Resolve the newest archive.
    ///
    /// The version comes from a `VERSION` entry at the archive root, falling
    /// back to the file stem.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when nothing matches.
    pub fn resolve_latest(&self) -> Result<Release> {
        let archive = glob_newest_file(&self.pattern())?;
        let version = match version_from_archive(&archive) {
            Some(version) => version,
            None => archive
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        info!(archive = %archive.display(), version = %version, "selected newest archive");
        Ok(Release {
            version,
            locator: Locator::File(archive),
        })
    }
}

/// Return the file matching `pattern` with the most recent modification time.
///
/// On equal times the first match in listing order wins. Name files so only
/// one matches when a deterministic pick matters.
///
/// # Errors
///
/// Returns `Error::Config` for an invalid pattern and `Error::NotFound` when
/// no file matches.
pub fn glob_newest_file(pattern: &str) -> Result<PathBuf> {
    let paths = glob::glob(pattern)
        .map_err(|e| Error::Config(format!("invalid glob pattern '{pattern}': {e}")))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable glob entry: {e}");
                continue;
            }
        };

        let modified = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.modified()?,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };

        let replace = newest.as_ref().map_or(true, |(best, _)| modified > *best);
        if replace {
            newest = Some((modified, path));
        }
    }

    newest
        .map(|(_, path)| path)
        .ok_or_else(|| Error::NotFound(format!("no file matches {pattern}")))
}

/// Read the `VERSION` entry at the root of a zip archive, if any.
fn version_from_archive(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(e) => {
            debug!("{} is not a readable zip: {e}", path.display());
            return None;
        }
    };

    let mut entry = archive.by_name(VERSION_FILE).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    let version = content.trim();
    (!version.is_empty()).then(|| version.to_string())
}
