//! # xupdater
//!
//! Self-update core for single-executable tools.
//!
//! ## Architecture
//!
//! An update runs as one linear pass:
//!
//! - **Source**: where candidates come from (GitHub releases, a local
//!   directory, or the newest zip file matching a glob)
//! - **Version resolution**: semver ordering with a string-inequality fallback
//! - **Artifact fetching**: download, optional digest check, unpack into a
//!   scoped staging directory, locate the platform-qualified executable
//! - **Swapping**: sibling temp file plus atomic rename, with a rename-aside
//!   strategy and rollback where a running binary cannot be replaced in place
//!
//! ## Example
//!
//! ```rust,ignore
//! use xupdater::{ProviderKind, UpdaterBuilder, UpdaterConfig};
//!
//! #[tokio::main]
//! async fn main() -> xupdater::Result<()> {
//!     let config = UpdaterConfig::new(
//!         ProviderKind::Remote,
//!         "https://github.com/acme/tool",
//!         "tool",
//!         env!("CARGO_PKG_VERSION"),
//!     );
//!     let updater = UpdaterBuilder::new(config).build()?;
//!     updater.update_and_exit().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod fetcher;
pub mod request;
pub mod source;
pub mod swap;
pub mod updater;
pub mod version;

pub use config::{ProviderKind, ReleaseChannel, UpdateSpec, UpdaterConfig};
pub use error::{Error, Result};
pub use event::{create_event_channel, UpdateEvent, UpdateEventsChannel, UpdateEventsSender};
pub use fetcher::{ArtifactFetcher, CandidateArtifact};
pub use request::{platform_tag, UpdateRequest};
pub use source::{Locator, Payload, Release, Source};
pub use swap::{SwapLock, SwapReport, SwapStrategy, Swapper};
pub use updater::{exit_with, UpdateOutcome, Updater, UpdaterBuilder};
pub use version::needs_update;
