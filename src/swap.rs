//! Atomic executable replacement.
//!
//! The candidate is first copied to a hidden temp file in the target's own
//! directory, so the final step is a same-filesystem rename. A reader of the
//! target path therefore sees either the old executable or the new one,
//! never a partial file.
//!
//! Two strategies exist:
//!
//! - **Rename over**: rename the temp file straight over the target.
//! - **Rename aside**: for platforms that refuse to replace a running
//!   executable, move the target to `<target>.old` first, then rename the
//!   temp file into place. The backup stays until [`Swapper::commit`] is
//!   called (after the new binary has started) or is restored by
//!   [`Swapper::rollback`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const BACKUP_SUFFIX: &str = ".old";
const LOCK_SUFFIX: &str = ".lock";

/// `EXDEV` on unix, `ERROR_NOT_SAME_DEVICE` on Windows.
const CROSS_DEVICE_CODE: Option<i32> = if cfg!(windows) {
    Some(17)
} else if cfg!(unix) {
    Some(18)
} else {
    None
};

/// How the final rename is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapStrategy {
    /// Rename the staged file directly over the target.
    RenameOver,
    /// Move the target to a backup first, then rename the staged file in.
    RenameAside,
}

impl SwapStrategy {
    /// Pick the strategy the running platform supports.
    ///
    /// Windows locks the image of a running executable against replacement
    /// but still allows renaming it.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::RenameAside
        } else {
            Self::RenameOver
        }
    }
}

/// Points in a swap where a failure can be injected (tests) or observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    /// Candidate copied to the sibling temp file with permissions applied.
    Staged,
    /// Target moved to its backup path (rename-aside only).
    MovedAside,
    /// About to rename the staged file over the target path.
    Committing,
}

/// Successful replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    /// Strategy that was used.
    pub strategy: SwapStrategy,
    /// Backup of the previous executable, kept until committed.
    pub backup: Option<PathBuf>,
}

/// Replaces an executable on disk.
#[derive(Debug, Clone, Copy)]
pub struct Swapper {
    strategy: SwapStrategy,
}

impl Swapper {
    /// Create a swapper with an explicit strategy.
    #[must_use]
    pub fn new(strategy: SwapStrategy) -> Self {
        Self { strategy }
    }

    /// Create a swapper using the platform's strategy.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(SwapStrategy::detect())
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> SwapStrategy {
        self.strategy
    }

    /// Replace `target` with a copy of `candidate`, keeping the target's
    /// permission bits.
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied`, `Error::CrossDeviceLink` or
    /// `Error::Io`. On error the target still holds the original executable.
    /// A rename-aside swap returns `Error::Unconfirmed` while the backup of
    /// an earlier swap is still pending.
    pub fn replace(&self, target: &Path, candidate: &Path) -> Result<SwapReport> {
        self.replace_with_checkpoints(target, candidate, |_| Ok(()))
    }

    /// [`Self::replace`], calling `checkpoint` at each [`SwapStep`]. An error
    /// from the checkpoint aborts the swap as if the filesystem had failed.
    pub(crate) fn replace_with_checkpoints<F>(
        &self,
        target: &Path,
        candidate: &Path,
        mut checkpoint: F,
    ) -> Result<SwapReport>
    where
        F: FnMut(SwapStep) -> io::Result<()>,
    {
        if self.strategy == SwapStrategy::RenameAside {
            let backup = backup_path(target);
            if backup.exists() {
                // The only copy of the previous executable; keep it until
                // commit or rollback.
                warn!(backup = %backup.display(), "previous update not confirmed");
                return Err(Error::Unconfirmed(backup));
            }
        }

        let permissions = fs::metadata(target)
            .map_err(|e| swap_error(e, target))?
            .permissions();
        let dir = parent_dir(target);
        let file_name = target.file_name().ok_or_else(|| {
            Error::Config(format!("target {} has no file name", target.display()))
        })?;

        let prefix = format!(".{}.", file_name.to_string_lossy());
        let mut staged = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".new")
            .tempfile_in(dir)
            .map_err(|e| swap_error(e, dir))?;

        let mut input = fs::File::open(candidate)?;
        io::copy(&mut input, staged.as_file_mut()).map_err(|e| swap_error(e, staged.path()))?;
        staged.as_file().sync_all()?;
        fs::set_permissions(staged.path(), permissions)
            .map_err(|e| swap_error(e, staged.path()))?;
        checkpoint(SwapStep::Staged).map_err(|e| swap_error(e, target))?;
        debug!("Staged candidate at {}", staged.path().display());

        match self.strategy {
            SwapStrategy::RenameOver => {
                checkpoint(SwapStep::Committing).map_err(|e| swap_error(e, target))?;
                staged
                    .persist(target)
                    .map_err(|e| swap_error(e.error, target))?;

                info!(path = %target.display(), "replaced executable in place");
                Ok(SwapReport {
                    strategy: self.strategy,
                    backup: None,
                })
            }
            SwapStrategy::RenameAside => {
                let backup = backup_path(target);
                fs::rename(target, &backup).map_err(|e| swap_error(e, target))?;

                let committed = checkpoint(SwapStep::MovedAside)
                    .and_then(|()| checkpoint(SwapStep::Committing))
                    .and_then(|()| staged.persist(target).map(drop).map_err(|e| e.error));

                if let Err(e) = committed {
                    restore_backup(&backup, target);
                    return Err(swap_error(e, target));
                }

                info!(
                    path = %target.display(),
                    backup = %backup.display(),
                    "replaced executable, previous kept as backup"
                );
                Ok(SwapReport {
                    strategy: self.strategy,
                    backup: Some(backup),
                })
            }
        }
    }

    /// Delete the backup left by a rename-aside swap once the new executable
    /// has started. Returns whether a backup existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup exists but cannot be removed.
    pub fn commit(target: &Path) -> Result<bool> {
        let backup = backup_path(target);
        match fs::remove_file(&backup) {
            Ok(()) => {
                info!("Removed backup {}", backup.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(swap_error(e, &backup)),
        }
    }

    /// Restore the backup over the target. Returns whether a backup existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup exists but cannot be renamed back.
    pub fn rollback(target: &Path) -> Result<bool> {
        let backup = backup_path(target);
        if !backup.exists() {
            return Ok(false);
        }
        fs::rename(&backup, target).map_err(|e| swap_error(e, target))?;
        warn!("Rolled back {} from {}", target.display(), backup.display());
        Ok(true)
    }
}

fn restore_backup(backup: &Path, target: &Path) {
    match fs::rename(backup, target) {
        Ok(()) => warn!("Swap failed, restored {}", target.display()),
        Err(e) => error!(
            "Swap failed and restore failed; previous executable is at {}: {e}",
            backup.display()
        ),
    }
}

/// Path of the backup kept by rename-aside swaps: `<target>.old`.
#[must_use]
pub fn backup_path(target: &Path) -> PathBuf {
    with_suffix(target, BACKUP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn swap_error(e: io::Error, path: &Path) -> Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied(path.to_path_buf())
    } else if e.raw_os_error().is_some() && e.raw_os_error() == CROSS_DEVICE_CODE {
        Error::CrossDeviceLink(path.to_path_buf())
    } else {
        Error::Io(e)
    }
}

/// Exclusive lock serializing swaps of one target.
///
/// The lock is a `<target>.lock` file created with `create_new`; it is
/// removed when the guard drops.
#[derive(Debug)]
pub struct SwapLock {
    path: PathBuf,
}

impl SwapLock {
    /// Acquire the lock for `target`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked` if another update holds it.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = with_suffix(target, LOCK_SUFFIX);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Owner pid, for humans inspecting a stale lock.
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(Error::Locked(target.to_path_buf()))
            }
            Err(e) => Err(swap_error(e, &path)),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SwapLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {e}", self.path.display());
        }
    }
}
