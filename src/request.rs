//! Immutable description of one update invocation.

use crate::config::{ProviderKind, UpdaterConfig};
use crate::error::Result;

/// Platform tag for the running OS and architecture, as `OS_ARCH`.
///
/// Names follow the Go toolchain spelling used by common release tooling
/// (`linux_amd64`, `darwin_arm64`, `windows_386`), so archives published by
/// those pipelines keep matching.
#[must_use]
pub fn platform_tag() -> String {
    format!(
        "{}_{}",
        os_name(std::env::consts::OS),
        arch_name(std::env::consts::ARCH)
    )
}

fn os_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn arch_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// One update invocation. Built once from a validated config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Provider kind.
    pub provider: ProviderKind,
    /// Repository URL, directory path, or glob directory.
    pub location: String,
    /// Base executable name.
    pub executable_base_name: String,
    /// `OS_ARCH` tag of the running platform.
    pub platform_tag: String,
    /// Version of the running executable.
    pub current_version: String,
}

impl UpdateRequest {
    /// Create a request for the running platform.
    #[must_use]
    pub fn new(
        provider: ProviderKind,
        location: impl Into<String>,
        executable_base_name: impl Into<String>,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            location: location.into(),
            executable_base_name: executable_base_name.into(),
            platform_tag: platform_tag(),
            current_version: current_version.into(),
        }
    }

    /// Build a request from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration does not validate.
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.provider,
            config.uri.trim(),
            config.name.trim(),
            config.current_version.trim(),
        ))
    }

    /// Override the platform tag (cross-platform staging, tests).
    #[must_use]
    pub fn with_platform_tag(mut self, tag: impl Into<String>) -> Self {
        self.platform_tag = tag.into();
        self
    }

    /// Executable name qualified with the platform tag: `name_OS_ARCH`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}_{}", self.executable_base_name, self.platform_tag)
    }

    /// Archive name published for this platform: `name_OS_ARCH.zip`.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.qualified_name())
    }

    /// File name of the executable inside the archive.
    #[must_use]
    pub fn executable_file_name(&self) -> String {
        format!("{}{}", self.qualified_name(), std::env::consts::EXE_SUFFIX)
    }
}
