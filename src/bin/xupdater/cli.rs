//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use color_eyre::eyre::eyre;
use std::path::PathBuf;
use xupdater::config::{default_config_path, ProviderKind, ReleaseChannel, UpdateSpec};
use xupdater::{SwapStrategy, UpdaterConfig};

/// Replace an executable with the newest release from GitHub or a local drop.
#[derive(Parser, Debug)]
#[command(name = "xupdater")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Update source as `<provider>,<uri>,<name>`, e.g.
    /// `github,https://github.com/acme/tool,tool` or `,/srv/drop,tool`.
    #[arg(long, short, env = "XUPDATER_UPDATE")]
    pub update: Option<UpdateSpec>,

    /// Provider kind (github, local or zip).
    #[arg(long, env = "XUPDATER_PROVIDER", conflicts_with = "update")]
    pub provider: Option<ProviderKind>,

    /// Repository URL or local directory.
    #[arg(long, env = "XUPDATER_URI", conflicts_with = "update")]
    pub uri: Option<String>,

    /// Base executable name, without platform tag.
    #[arg(long, env = "XUPDATER_NAME", conflicts_with = "update")]
    pub name: Option<String>,

    /// Version of the installed executable. Defaults to the config file's
    /// value, else this binary's version.
    #[arg(long, env = "XUPDATER_CURRENT_VERSION")]
    pub current_version: Option<String>,

    /// Executable to replace (defaults to this binary).
    #[arg(long, short, env = "XUPDATER_TARGET")]
    pub target: Option<PathBuf>,

    /// Release channel for GitHub sources.
    #[arg(long, value_enum, env = "XUPDATER_CHANNEL")]
    pub channel: Option<CliReleaseChannel>,

    /// Fetch timeout in seconds.
    #[arg(long, env = "XUPDATER_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Expected SHA-256 of the downloaded archive.
    #[arg(long, env = "XUPDATER_SHA256")]
    pub sha256: Option<String>,

    /// Candidate version for local directory sources.
    #[arg(long, env = "XUPDATER_CANDIDATE_VERSION")]
    pub candidate_version: Option<String>,

    /// Override the platform's swap strategy.
    #[arg(long, value_enum, env = "XUPDATER_SWAP_STRATEGY")]
    pub swap_strategy: Option<CliSwapStrategy>,

    /// Log level (defaults to `info`).
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Delete the backup of the previous executable after a successful start.
    #[arg(long, conflicts_with = "rollback")]
    pub confirm: bool,

    /// Restore the previous executable from its backup.
    #[arg(long)]
    pub rollback: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// What the binary does once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Resolve, fetch and swap.
    Update,
    /// Drop the rename-aside backup.
    Confirm,
    /// Restore the rename-aside backup.
    Rollback,
}

/// Release channel CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliReleaseChannel {
    /// Stable releases only.
    Stable,
    /// Beta releases.
    Beta,
}

/// Swap strategy CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliSwapStrategy {
    /// Rename the new executable straight over the old one.
    RenameOver,
    /// Move the old executable aside first.
    RenameAside,
}

impl Cli {
    /// Selected mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.rollback {
            Mode::Rollback
        } else if self.confirm {
            Mode::Confirm
        } else {
            Mode::Update
        }
    }

    /// Convert CLI arguments into an `UpdaterConfig`.
    ///
    /// A config file (explicit, else the default location if present) is
    /// loaded first; flags given on the command line override its values.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be loaded or no source is
    /// given on the command line or in a file.
    pub fn into_config(self) -> color_eyre::Result<UpdaterConfig> {
        let file = self
            .config
            .or_else(|| default_config_path().filter(|path| path.is_file()));

        // Start from the config file, else from the source flags
        let mut config = if let Some(ref path) = file {
            UpdaterConfig::from_file(path)?
        } else {
            let spec = match self.update {
                Some(ref spec) => spec.clone(),
                None => {
                    let (Some(provider), Some(uri), Some(name)) =
                        (self.provider, self.uri.clone(), self.name.clone())
                    else {
                        return Err(eyre!(
                            "no update source: pass --update <provider>,<uri>,<name>, \
                             --provider, --uri and --name, or --config"
                        ));
                    };
                    UpdateSpec {
                        provider,
                        uri,
                        name,
                    }
                }
            };
            UpdaterConfig::from_spec(spec, env!("CARGO_PKG_VERSION"))
        };

        // Override with CLI arguments
        if let Some(spec) = self.update {
            config.provider = spec.provider;
            config.uri = spec.uri;
            config.name = spec.name;
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(uri) = self.uri {
            config.uri = uri;
        }
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(current_version) = self.current_version {
            config.current_version = current_version;
        }
        if let Some(target) = self.target {
            config.target = Some(target);
        }
        if let Some(channel) = self.channel {
            config.channel = channel.into();
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if self.sha256.is_some() {
            config.expected_sha256 = self.sha256;
        }
        if self.candidate_version.is_some() {
            config.candidate_version = self.candidate_version;
        }
        if let Some(strategy) = self.swap_strategy {
            config.swap_strategy = Some(strategy.into());
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        Ok(config)
    }
}

impl From<CliReleaseChannel> for ReleaseChannel {
    fn from(c: CliReleaseChannel) -> Self {
        match c {
            CliReleaseChannel::Stable => ReleaseChannel::Stable,
            CliReleaseChannel::Beta => ReleaseChannel::Beta,
        }
    }
}

impl From<CliSwapStrategy> for SwapStrategy {
    fn from(s: CliSwapStrategy) -> Self {
        match s {
            CliSwapStrategy::RenameOver => SwapStrategy::RenameOver,
            CliSwapStrategy::RenameAside => SwapStrategy::RenameAside,
        }
    }
}
