//! Candidate retrieval and staging.
//!
//! The fetcher pulls a payload from a [`Source`], optionally checks its
//! SHA-256, unpacks it into a private staging directory, and locates the
//! platform-qualified executable. The staging directory is owned by the
//! returned [`CandidateArtifact`] (or dropped on error), so it is removed on
//! every path.

use crate::error::{Error, Result};
use crate::request::UpdateRequest;
use crate::source::{Payload, Release, Source};
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Supported archive formats, detected from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// PKZIP archive.
    Zip,
    /// Gzip-compressed tarball.
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format of an archive from its magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
            Some(Self::Zip)
        } else if bytes.starts_with(GZIP_MAGIC) {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// A fetched, unpacked candidate executable.
///
/// Dropping the artifact removes its staging directory.
#[derive(Debug)]
pub struct CandidateArtifact {
    version: String,
    staging: TempDir,
    executable: PathBuf,
    digest: [u8; 32],
}

impl CandidateArtifact {
    /// Version tag of the candidate.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Path of the staged executable.
    #[must_use]
    pub fn executable_path(&self) -> &Path {
        &self.executable
    }

    /// Staging directory (removed on drop).
    #[must_use]
    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    /// SHA-256 of the staged executable.
    #[must_use]
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

/// Retrieves and stages candidates.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
    expected_sha256: Option<String>,
    staging_root: Option<PathBuf>,
}

impl ArtifactFetcher {
    /// Create a fetcher that gives up on a download after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: None,
            expected_sha256: None,
            staging_root: None,
        }
    }

    /// Abort the download when the watched flag turns `true`.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Require the archive to hash to this hex SHA-256.
    #[must_use]
    pub fn with_expected_sha256(mut self, digest: Option<String>) -> Self {
        self.expected_sha256 = digest.map(|d| d.trim().to_ascii_lowercase());
        self
    }

    /// Create staging directories under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Fetch, verify and stage the candidate for `release`.
    ///
    /// # Errors
    ///
    /// - `Error::Network` / `Error::NotFound` from the source, or a timeout
    /// - `Error::Cancelled` if the cancellation flag fires during download
    /// - `Error::ChecksumMismatch` if the archive digest is wrong
    /// - `Error::CorruptArchive` if unpacking fails
    /// - `Error::ArtifactMissing` if no entry has the expected name
    /// - `Error::Io` if the staging area cannot be written
    pub async fn fetch(
        &self,
        source: &Source,
        release: &Release,
        request: &UpdateRequest,
    ) -> Result<CandidateArtifact> {
        let payload = self.download(source, release).await?;
        let staging = self.create_staging()?;
        let file_name = request.executable_file_name();

        let executable = match payload {
            Payload::Archive(bytes) => {
                self.verify_checksum(&bytes)?;
                let dest = staging.path().to_path_buf();
                tokio::task::spawn_blocking(move || unpack(&bytes, &dest))
                    .await
                    .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))??;
                locate_executable(staging.path(), &file_name, false)?
            }
            Payload::Directory(dir) => {
                if self.expected_sha256.is_some() {
                    warn!("Checksum configured but candidate is a directory; skipping check");
                }
                let found = locate_executable(&dir, &file_name, true)?;
                let staged = staging.path().join(&file_name);
                fs::copy(&found, &staged)?;
                staged
            }
        };

        let digest = sha256_file(&executable)?;
        info!(
            version = %release.version,
            executable = %executable.display(),
            "staged candidate"
        );

        Ok(CandidateArtifact {
            version: release.version.clone(),
            staging,
            executable,
            digest,
        })
    }

    async fn download(&self, source: &Source, release: &Release) -> Result<Payload> {
        let fetch = tokio::time::timeout(self.timeout, source.fetch(release));

        let outcome = match self.cancel.clone() {
            Some(mut cancel) => {
                tokio::select! {
                    biased;
                    () = cancelled(&mut cancel) => return Err(Error::Cancelled),
                    outcome = fetch => outcome,
                }
            }
            None => fetch.await,
        };

        outcome.map_err(|_| {
            Error::Network(format!(
                "fetch timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
    }

    fn create_staging(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("xupdater-stage-");
        let staging = match self.staging_root {
            Some(ref root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!("Staging in {}", staging.path().display());
        Ok(staging)
    }

    fn verify_checksum(&self, bytes: &[u8]) -> Result<()> {
        let Some(ref expected) = self.expected_sha256 else {
            return Ok(());
        };
        let actual = hex::encode(Sha256::digest(bytes));
        if actual == *expected {
            debug!("Archive checksum verified");
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: expected.clone(),
                actual,
            })
        }
    }
}

/// Resolve once the watched flag is `true`. Never resolves if the sender is
/// dropped without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Unpack an archive into `dest`.
///
/// # Errors
///
/// Returns `Error::CorruptArchive` for unreadable archives and `Error::Io`
/// for staging write failures.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<()> {
    match ArchiveFormat::sniff(bytes) {
        Some(ArchiveFormat::Zip) => unpack_zip(bytes, dest),
        Some(ArchiveFormat::TarGz) => unpack_tar_gz(bytes, dest),
        None => Err(Error::CorruptArchive(
            "unrecognised archive format (expected zip or tar.gz)".to_string(),
        )),
    }
}

fn unpack_zip(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::CorruptArchive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::CorruptArchive(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }

        let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut data)
            .map_err(|e| Error::CorruptArchive(format!("{}: {e}", entry.name())))?;

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out, &data)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(())
}

fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
    let entries = archive.entries().map_err(archive_error)?;

    for entry in entries {
        let mut entry = entry.map_err(archive_error)?;
        if !entry.unpack_in(dest).map_err(archive_error)? {
            warn!("Skipping tar entry outside the staging area");
        }
    }

    Ok(())
}

/// Decoding failures are corruption; anything else is a staging write error.
fn archive_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            Error::CorruptArchive(e.to_string())
        }
        _ => Error::Io(e),
    }
}

/// Find a regular file named `file_name` anywhere under `root`.
///
/// Symlinks are followed only when `follow_links` is set. Unpacked archives
/// are searched without following them, so an archive cannot point the
/// swap at a file outside its staging directory.
///
/// # Errors
///
/// Returns `Error::ArtifactMissing` if there is none.
pub fn locate_executable(root: &Path, file_name: &str, follow_links: bool) -> Result<PathBuf> {
    WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Error walking {}: {e}", root.display());
                None
            }
        })
        .find(|entry| entry.file_type().is_file() && entry.file_name() == OsStr::new(file_name))
        .map(walkdir::DirEntry::into_path)
        .ok_or_else(|| Error::ArtifactMissing(file_name.to_string()))
}

/// SHA-256 of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<[u8; 32]> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}
