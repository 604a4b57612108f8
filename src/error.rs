//! Error types for xupdater.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort an update.
#[derive(Error, Debug)]
pub enum Error {
    /// No candidate is available (no release, missing path, empty glob).
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure talking to a remote source.
    #[error("network error: {0}")]
    Network(String),

    /// The fetched archive could not be unpacked.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// The archive unpacked but holds no executable with the expected name.
    #[error("artifact missing: no entry named {0}")]
    ArtifactMissing(String),

    /// The archive digest does not match the configured one.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Configured hex digest.
        expected: String,
        /// Digest of the bytes actually fetched.
        actual: String,
    },

    /// Permission denied while replacing the executable.
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Staging file and target live on different filesystems.
    #[error("cross-device link: {}", .0.display())]
    CrossDeviceLink(PathBuf),

    /// Another update holds the swap lock for this target.
    #[error("update already in progress: {}", .0.display())]
    Locked(PathBuf),

    /// A previous rename-aside swap left a backup that was never confirmed
    /// or rolled back.
    #[error("unconfirmed previous update, confirm or roll back first: {}", .0.display())]
    Unconfirmed(PathBuf),

    /// The caller cancelled the update.
    #[error("update cancelled")]
    Cancelled,

    /// The update finished without a confirmed result.
    #[error("unknown outcome: {0}")]
    UnknownOutcome(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code reported for this error.
    ///
    /// Every failure is non-zero; configuration mistakes get their own code so
    /// wrapper scripts can tell them apart from runtime failures.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
