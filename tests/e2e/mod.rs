//! End-to-end tests for xupdater.
//!
//! A `wiremock` server stands in for the GitHub releases API and the asset
//! host; the target executable is a plain file in a temp directory.

mod harness;
mod update_flow;

pub use harness::TestHarness;
