//! Configuration for xupdater.

use crate::error::{Error, Result};
use crate::swap::SwapStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where update candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Tagged GitHub releases.
    #[serde(alias = "github")]
    Remote,
    /// A local directory holding the unpacked candidate.
    #[serde(alias = "local")]
    LocalDir,
    /// The newest `*.zip` file in a local directory.
    #[serde(alias = "zip")]
    LocalZipGlob,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // An empty tag is the documented spelling for a local directory:
        // `--update ,<LOCAL_DIRECTORY>,<name>`.
        match s.trim().to_ascii_lowercase().as_str() {
            "github" | "remote" => Ok(Self::Remote),
            "" | "local" | "local-dir" => Ok(Self::LocalDir),
            "zip" | "local-zip-glob" => Ok(Self::LocalZipGlob),
            other => Err(Error::Config(format!(
                "unknown provider '{other}' (expected github, local or zip)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Remote => "github",
            Self::LocalDir => "local",
            Self::LocalZipGlob => "zip",
        };
        f.write_str(tag)
    }
}

/// Release channel for remote sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    /// Stable releases only.
    #[default]
    Stable,
    /// Beta releases (includes stable and pre-releases).
    Beta,
}

/// The compact `provider,uri,name` triple accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSpec {
    /// Provider kind.
    pub provider: ProviderKind,
    /// Repository URL, directory path, or glob directory.
    pub uri: String,
    /// Base executable name.
    pub name: String,
}

impl FromStr for UpdateSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ',');
        let (Some(provider), Some(uri), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Config(format!(
                "update spec '{s}' must look like <provider>,<uri>,<name>"
            )));
        };

        Ok(Self {
            provider: provider.parse()?,
            uri: uri.trim().to_string(),
            name: name.trim().to_string(),
        })
    }
}

/// Updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Provider kind.
    pub provider: ProviderKind,

    /// Repository URL, directory path, or glob directory.
    pub uri: String,

    /// Base executable name (without platform tag).
    pub name: String,

    /// Version of the running executable.
    pub current_version: String,

    /// Executable to replace. Defaults to the running executable.
    #[serde(default)]
    pub target: Option<PathBuf>,

    /// Release channel (remote sources only).
    #[serde(default)]
    pub channel: ReleaseChannel,

    /// Fetch timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// GitHub API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Expected SHA-256 of the archive, hex encoded.
    #[serde(default)]
    pub expected_sha256: Option<String>,

    /// Version marker for local directory candidates.
    #[serde(default)]
    pub candidate_version: Option<String>,

    /// Swap strategy override. Detected from the platform when unset.
    #[serde(default)]
    pub swap_strategy: Option<SwapStrategy>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

const fn default_timeout_secs() -> u64 {
    300 // 5 minutes
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "xupdater")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl UpdaterConfig {
    /// Create a configuration with defaults for every optional field.
    #[must_use]
    pub fn new(
        provider: ProviderKind,
        uri: impl Into<String>,
        name: impl Into<String>,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            uri: uri.into(),
            name: name.into(),
            current_version: current_version.into(),
            target: None,
            channel: ReleaseChannel::default(),
            timeout_secs: default_timeout_secs(),
            api_base_url: default_api_base_url(),
            expected_sha256: None,
            candidate_version: None,
            swap_strategy: None,
            log_level: default_log_level(),
        }
    }

    /// Build a configuration from a `provider,uri,name` spec.
    #[must_use]
    pub fn from_spec(spec: UpdateSpec, current_version: impl Into<String>) -> Self {
        Self::new(spec.provider, spec.uri, spec.name, current_version)
    }

    /// Check that every required field is usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(Error::Config("uri must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Config("name must not be empty".to_string()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "name '{}' must be a file name, not a path",
                self.name
            )));
        }
        if self.current_version.trim().is_empty() {
            return Err(Error::Config(
                "current_version must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        if let Some(ref digest) = self.expected_sha256 {
            let valid = hex::decode(digest.trim()).is_ok_and(|bytes| bytes.len() == 32);
            if !valid {
                return Err(Error::Config(format!(
                    "expected_sha256 '{digest}' is not a hex SHA-256 digest"
                )));
            }
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
