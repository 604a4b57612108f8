//! Update orchestration.
//!
//! Drives `Idle -> Resolving -> (UpToDate | Fetching) -> Swapping -> Done`.
//! Any error stops the machine in its current state; nothing on disk changes
//! before `Swapping`, and the swapper itself is all-or-nothing.

use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, UpdateEvent, UpdateEventsChannel, UpdateEventsSender};
use crate::fetcher::{sha256_file, ArtifactFetcher};
use crate::request::UpdateRequest;
use crate::source::Source;
use crate::swap::{SwapLock, SwapReport, Swapper};
use crate::version::needs_update;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Terminal result of one update invocation.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The running version is current; nothing was fetched or swapped.
    UpToDate {
        /// Version advertised by the source.
        version: String,
    },
    /// The executable was replaced.
    Updated {
        /// Installed version.
        version: String,
        /// How the swap was performed.
        report: SwapReport,
    },
    /// The update aborted.
    Failed(Error),
}

impl UpdateOutcome {
    /// Exit code for the process boundary: 0 unless failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UpToDate { .. } | Self::Updated { .. } => 0,
            Self::Failed(e) => e.exit_code(),
        }
    }

    /// Short status label for logs.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::UpToDate { .. } => "up-to-date",
            Self::Updated { .. } => "updated",
            Self::Failed(_) => "failed",
        }
    }

    /// Convert `Failed` into an error.
    ///
    /// # Errors
    ///
    /// Returns the failure reason of a `Failed` outcome.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Failed(e) => Err(e),
            other => Ok(other),
        }
    }
}

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateState {
    Idle,
    Resolving,
    Fetching,
    Swapping,
    Done,
}

/// Builder for an [`Updater`].
pub struct UpdaterBuilder {
    config: UpdaterConfig,
    cancel: Option<watch::Receiver<bool>>,
    staging_root: Option<PathBuf>,
}

impl UpdaterBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: UpdaterConfig) -> Self {
        Self {
            config,
            cancel: None,
            staging_root: None,
        }
    }

    /// Abort downloads when the watched flag turns `true`.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Stage candidates under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Validate the configuration and build the updater.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid configuration, or `Error::Io` if
    /// no target is configured and the running executable cannot be found.
    pub fn build(self) -> Result<Updater> {
        let request = UpdateRequest::from_config(&self.config)?;
        let source = Source::from_config(&request, &self.config)?;

        let target = match self.config.target {
            Some(ref target) => target.clone(),
            None => std::env::current_exe()?,
        };

        let mut fetcher = ArtifactFetcher::new(Duration::from_secs(self.config.timeout_secs))
            .with_expected_sha256(self.config.expected_sha256.clone());
        if let Some(cancel) = self.cancel {
            fetcher = fetcher.with_cancellation(cancel);
        }
        if let Some(root) = self.staging_root {
            fetcher = fetcher.with_staging_root(root);
        }

        let swapper = self
            .config
            .swap_strategy
            .map_or_else(Swapper::detect, Swapper::new);

        let (events_tx, _) = create_event_channel();

        Ok(Updater {
            request,
            source,
            fetcher,
            swapper,
            target,
            events_tx,
        })
    }
}

/// Runs updates for one executable.
pub struct Updater {
    request: UpdateRequest,
    source: Source,
    fetcher: ArtifactFetcher,
    swapper: Swapper,
    target: PathBuf,
    events_tx: UpdateEventsSender,
}

impl Updater {
    /// The request this updater serves.
    #[must_use]
    pub fn request(&self) -> &UpdateRequest {
        &self.request
    }

    /// The executable that gets replaced.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Subscribe to progress events.
    #[must_use]
    pub fn subscribe_events(&self) -> UpdateEventsChannel {
        self.events_tx.subscribe()
    }

    /// Run the update and return its tri-state outcome. Never exits.
    pub async fn run(&self) -> UpdateOutcome {
        let mut state = UpdateState::Idle;
        let outcome = match self.drive(&mut state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(state = ?state, error = %e, "update failed");
                let _ = self.events_tx.send(UpdateEvent::Failed {
                    message: e.to_string(),
                });
                UpdateOutcome::Failed(e)
            }
        };
        self.advance(&mut state, UpdateState::Done);
        outcome
    }

    /// Run the update, returning failures as errors.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the update.
    pub async fn update(&self) -> Result<UpdateOutcome> {
        self.run().await.into_result()
    }

    /// Run the update, log the outcome, and exit the process: 0 when updated
    /// or already current, non-zero otherwise. Does not return.
    pub async fn update_and_exit(&self) {
        let outcome = self.run().await;
        exit_with(&outcome);
    }

    /// Delete the backup of the previous executable. Call once the new
    /// binary has started correctly.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot be removed.
    pub fn confirm_started(&self) -> Result<bool> {
        Swapper::commit(&self.target)
    }

    /// Restore the previous executable from its backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot be restored.
    pub fn rollback(&self) -> Result<bool> {
        Swapper::rollback(&self.target)
    }

    async fn drive(&self, state: &mut UpdateState) -> Result<UpdateOutcome> {
        let location = self.source.location();
        info!(
            name = %self.request.qualified_name(),
            url = %location,
            version = %self.request.current_version,
            "try update from"
        );

        self.advance(state, UpdateState::Resolving);
        let _ = self.events_tx.send(UpdateEvent::Resolving { location });
        let release = self.source.resolve_latest().await?;

        if !needs_update(&self.request.current_version, &release.version) {
            info!(version = %release.version, "already up to date, no need to update");
            let _ = self.events_tx.send(UpdateEvent::UpToDate {
                version: release.version.clone(),
            });
            return Ok(UpdateOutcome::UpToDate {
                version: release.version,
            });
        }

        self.advance(state, UpdateState::Fetching);
        let _ = self.events_tx.send(UpdateEvent::Fetching {
            version: release.version.clone(),
        });
        let artifact = self
            .fetcher
            .fetch(&self.source, &release, &self.request)
            .await?;

        self.advance(state, UpdateState::Swapping);
        let _ = self.events_tx.send(UpdateEvent::Swapping {
            version: release.version.clone(),
        });
        let report = {
            let _lock = SwapLock::acquire(&self.target)?;
            let report = self
                .swapper
                .replace(&self.target, artifact.executable_path())?;
            verify_swap(&self.target, &report, artifact.digest())?;
            report
        };

        info!(
            version = %release.version,
            path = %self.target.display(),
            "updated"
        );
        let _ = self.events_tx.send(UpdateEvent::Updated {
            version: release.version.clone(),
        });
        Ok(UpdateOutcome::Updated {
            version: release.version,
            report,
        })
    }

    fn advance(&self, state: &mut UpdateState, next: UpdateState) {
        debug!(from = ?*state, to = ?next, path = %self.target.display(), "update state");
        *state = next;
    }
}

/// Check that `target` holds the staged candidate after a swap.
///
/// On a mismatch the backup of a rename-aside swap is restored; a
/// rename-over swap keeps no backup, so the target is left as found.
fn verify_swap(target: &Path, report: &SwapReport, expected: &[u8; 32]) -> Result<()> {
    let actual = sha256_file(target)?;
    if actual == *expected {
        return Ok(());
    }

    let restored = match report.backup {
        Some(_) => match Swapper::rollback(target) {
            Ok(restored) => restored,
            Err(e) => {
                error!(error = %e, "could not restore backup after failed verification");
                false
            }
        },
        None => false,
    };

    Err(Error::UnknownOutcome(format!(
        "{} does not match the staged candidate after swap (previous version restored: {restored})",
        target.display()
    )))
}

/// Log `outcome` and terminate the process with its exit code.
pub fn exit_with(outcome: &UpdateOutcome) -> ! {
    match outcome {
        UpdateOutcome::UpToDate { version } => {
            info!(status = outcome.status(), version = %version, "update finished");
        }
        UpdateOutcome::Updated { version, .. } => {
            info!(status = outcome.status(), version = %version, "update finished");
        }
        UpdateOutcome::Failed(e) => {
            error!(status = outcome.status(), error = %e, "update failed");
        }
    }
    std::process::exit(outcome.exit_code())
}
