//! Full update runs against the mock release host.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::{zip_bytes, TestHarness, OLD_BINARY, RELEASES_PATH};
use std::fs;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};
use xupdater::{Error, UpdateEvent, UpdateOutcome, UpdaterBuilder};

const NEW_BINARY: &[u8] = b"#!/bin/sh\necho new\n";

/// Test 1: the running version is already the latest; nothing is downloaded.
#[tokio::test]
async fn test_up_to_date_skips_download() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v1.2.0", "v1.1.0"]).await;
    harness.mount_asset("v1.2.0", Vec::new(), 0).await;

    let updater = UpdaterBuilder::new(harness.config("1.2.0"))
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap();
    let outcome = updater.run().await;

    match outcome {
        UpdateOutcome::UpToDate { ref version } => assert_eq!(version, "v1.2.0"),
        ref other => panic!("expected UpToDate, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
}

/// Test 2: a newer release is fetched and swapped in.
#[tokio::test]
async fn test_newer_release_is_installed() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v1.1.0", "v1.2.0"]).await;
    let archive = zip_bytes(&[(TestHarness::entry_name().as_str(), NEW_BINARY)]);
    harness.mount_asset("v1.2.0", archive, 1).await;

    let updater = UpdaterBuilder::new(harness.config("1.0.0"))
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap();
    let mut events = updater.subscribe_events();
    let outcome = updater.run().await;

    match outcome {
        UpdateOutcome::Updated { ref version, .. } => assert_eq!(version, "v1.2.0"),
        ref other => panic!("expected Updated, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(fs::read(harness.target()).unwrap(), NEW_BINARY);
    assert_eq!(harness.staging_entries(), 0, "staging must be cleaned up");

    #[cfg(unix)]
    assert_eq!(super::harness::mode_of(&harness.target()), 0o750);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(UpdateEvent::Resolving { .. })));
    assert_eq!(
        seen.last(),
        Some(&UpdateEvent::Updated {
            version: "v1.2.0".to_string()
        })
    );
}

/// Test 3: an unreachable index fails without touching the target.
#[tokio::test]
async fn test_unreachable_index_fails() {
    let harness = TestHarness::setup().await;
    let mut config = harness.config("1.0.0");
    config.api_base_url = "http://127.0.0.1:1".to_string();

    let outcome = UpdaterBuilder::new(config).build().unwrap().run().await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::Network(_))),
        "got {outcome:?}"
    );
    assert_ne!(outcome.exit_code(), 0);
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
}

/// Test 4: an unknown repository maps to NotFound.
#[tokio::test]
async fn test_missing_repository_is_not_found() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.server)
        .await;

    let outcome = UpdaterBuilder::new(harness.config("1.0.0"))
        .build()
        .unwrap()
        .run()
        .await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::NotFound(_))),
        "got {outcome:?}"
    );
}

/// Test 5: a release without the platform archive fails and leaves the
/// target alone.
#[tokio::test]
async fn test_missing_asset_is_not_found() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v2.0.0"]).await;
    // No asset mounted: the mock server answers 404.

    let outcome = UpdaterBuilder::new(harness.config("1.0.0"))
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap()
        .run()
        .await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::NotFound(_))),
        "got {outcome:?}"
    );
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
    assert_eq!(harness.staging_entries(), 0);
}

/// Test 6: an archive without the executable entry reports ArtifactMissing.
#[tokio::test]
async fn test_archive_without_executable() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v2.0.0"]).await;
    let archive = zip_bytes(&[("README.md", b"nothing here".as_slice())]);
    harness.mount_asset("v2.0.0", archive, 1).await;

    let outcome = UpdaterBuilder::new(harness.config("1.0.0"))
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap()
        .run()
        .await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::ArtifactMissing(_))),
        "got {outcome:?}"
    );
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
    assert_eq!(harness.staging_entries(), 0);
}

/// Test 7: a checksum mismatch aborts before the swap.
#[tokio::test]
async fn test_checksum_mismatch_aborts() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v2.0.0"]).await;
    let archive = zip_bytes(&[(TestHarness::entry_name().as_str(), NEW_BINARY)]);
    harness.mount_asset("v2.0.0", archive, 1).await;

    let mut config = harness.config("1.0.0");
    config.expected_sha256 = Some("00".repeat(32));

    let outcome = UpdaterBuilder::new(config)
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap()
        .run()
        .await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::ChecksumMismatch { .. })),
        "got {outcome:?}"
    );
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
}

/// Test 8: `update()` surfaces failures as errors.
#[tokio::test]
async fn test_update_returns_error() {
    let harness = TestHarness::setup().await;
    let mut config = harness.config("1.0.0");
    config.api_base_url = "http://127.0.0.1:1".to_string();

    let err = UpdaterBuilder::new(config)
        .build()
        .unwrap()
        .update()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)), "got {err:?}");
}

/// Test 9: a download slower than the timeout fails as a network error.
#[tokio::test]
async fn test_slow_download_times_out() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v2.0.0"]).await;
    let archive = zip_bytes(&[(TestHarness::entry_name().as_str(), NEW_BINARY)]);
    harness
        .mount_slow_asset("v2.0.0", archive, Duration::from_secs(10))
        .await;

    let mut config = harness.config("1.0.0");
    config.timeout_secs = 1;

    let started = Instant::now();
    let outcome = UpdaterBuilder::new(config)
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap()
        .run()
        .await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::Network(_))),
        "got {outcome:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
    assert_eq!(harness.staging_entries(), 0);
}

/// Test 10: cancelling mid-download aborts with `Cancelled`.
#[tokio::test]
async fn test_cancel_during_download() {
    let harness = TestHarness::setup().await;
    harness.mount_index(&["v2.0.0"]).await;
    let archive = zip_bytes(&[(TestHarness::entry_name().as_str(), NEW_BINARY)]);
    harness
        .mount_slow_asset("v2.0.0", archive, Duration::from_secs(10))
        .await;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let updater = UpdaterBuilder::new(harness.config("1.0.0"))
        .with_cancellation(cancel_rx)
        .with_staging_root(harness.staging_dir.path())
        .build()
        .unwrap();

    let mut events = updater.subscribe_events();
    tokio::spawn(async move {
        // Cancel once the download has started.
        while let Ok(event) = events.recv().await {
            if matches!(event, UpdateEvent::Fetching { .. }) {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let _ = cancel_tx.send(true);
                break;
            }
        }
    });

    let started = Instant::now();
    let outcome = updater.run().await;

    assert!(
        matches!(outcome, UpdateOutcome::Failed(Error::Cancelled)),
        "got {outcome:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(fs::read(harness.target()).unwrap(), OLD_BINARY);
    assert_eq!(harness.staging_entries(), 0);
}
