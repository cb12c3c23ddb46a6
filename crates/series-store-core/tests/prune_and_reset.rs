//! Version pruning and library resets.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use chrono::TimeDelta;
use common::{TestResult, bids, local_store, quotes};
use series_store_core::{
    ReadOptions, StoreConfig, StoreError, StoreOptions, VersionedSeriesStore, WriteOptions,
    metadata::write_mode::WriteMode, storage::StorageLocation,
};
use tempfile::TempDir;

#[tokio::test]
async fn pruning_update_keeps_one_full_version() -> TestResult {
    let tmp = TempDir::new()?;
    let store = local_store(&tmp, "").await?;
    let v1 = store
        .write("k", quotes(4..=6, 1.0), WriteOptions::default())
        .await?;
    store
        .write("k", quotes(7..=8, 1.0), WriteOptions::mode(WriteMode::Append))
        .await?;
    let v3 = store
        .write(
            "k",
            quotes([5], 10.0),
            WriteOptions::mode(WriteMode::Update).prune(true),
        )
        .await?;

    let versions = store.list_versions("k").await?;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, v3.version);
    assert_eq!(versions[0].operation, WriteMode::Update);
    assert_eq!(versions[0].row_count, 5);

    let full = store.read("k", ReadOptions::default()).await?;
    assert_eq!(
        bids(&full),
        vec![(4, 4.0), (5, 50.0), (6, 6.0), (7, 7.0), (8, 8.0)]
    );

    let err = store
        .read("k", ReadOptions::default().as_of(v1.created_at))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NoVersionAtTime { .. }));

    // The key keeps growing on top of the pruned version.
    let v4 = store
        .write("k", quotes([9], 1.0), WriteOptions::mode(WriteMode::Append))
        .await?;
    assert_eq!(v4.version, 4);
    assert_eq!(store.list_versions("k").await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn prune_default_comes_from_config() -> TestResult {
    let tmp = TempDir::new()?;
    let store = local_store(&tmp, "prune_previous_versions=true").await?;
    for d in 4..=7 {
        let mode = if d == 4 { WriteMode::Write } else { WriteMode::Append };
        store.write("k", quotes([d], 1.0), WriteOptions::mode(mode)).await?;
    }
    let versions = store.list_versions("k").await?;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 4);
    assert_eq!(store.read("k", ReadOptions::default()).await?.len(), 4);

    // One segment per surviving version.
    let segments = std::fs::read_dir(tmp.path().join("default/k/data"))?.count();
    assert_eq!(segments, 1);
    Ok(())
}

#[tokio::test]
async fn force_create_library_removes_every_key() -> TestResult {
    let tmp = TempDir::new()?;
    let store = local_store(&tmp, "library=fx").await?;
    for key in ["EURUSD", "USDJPY"] {
        store.write(key, quotes([4], 1.0), WriteOptions::default()).await?;
    }
    let other = local_store(&tmp, "library=rates").await?;
    other.write("SOFR", quotes([4], 1.0), WriteOptions::default()).await?;

    let reset = local_store(&tmp, "library=fx&force_create_library=true").await?;
    assert!(reset.list_keys().await?.is_empty());
    assert!(!reset.has_key("EURUSD").await?);
    let err = reset.read("EURUSD", ReadOptions::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound { .. }));

    // Other libraries are untouched.
    assert_eq!(other.list_keys().await?, vec!["SOFR".to_string()]);

    // A reset key starts again at version 1.
    let handle = reset
        .write("EURUSD", quotes([9], 1.0), WriteOptions::default())
        .await?;
    assert_eq!(handle.version, 1);
    Ok(())
}

#[tokio::test]
async fn force_create_library_on_a_bucket() -> TestResult {
    let location = StorageLocation::memory("scratch");
    let store = VersionedSeriesStore::open(StoreConfig::new(location.clone())).await?;
    store.write("k", quotes([4], 1.0), WriteOptions::default()).await?;
    assert_eq!(store.list_keys().await?, vec!["k".to_string()]);

    let options = StoreOptions {
        force_create_library: true,
        ..StoreOptions::default()
    };
    let reset =
        VersionedSeriesStore::open(StoreConfig::new(location).with_options(options)).await?;
    assert!(reset.list_keys().await?.is_empty());
    assert!(store.list_versions("k").await.is_err());
    Ok(())
}

#[tokio::test]
async fn pruned_history_is_not_visible_to_as_of_far_in_the_future() -> TestResult {
    let tmp = TempDir::new()?;
    let store = local_store(&tmp, "").await?;
    store.write("k", quotes([4], 1.0), WriteOptions::default()).await?;
    let v2 = store
        .write("k", quotes([5], 1.0), WriteOptions::default().prune(true))
        .await?;
    let later = v2.created_at + TimeDelta::days(1);
    let got = store.read("k", ReadOptions::default().as_of(later)).await?;
    assert_eq!(bids(&got), vec![(5, 5.0)]);
    Ok(())
}
