//! Point-in-time reads across a sequence of versions.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use chrono::TimeDelta;
use common::{TestResult, day, local_store, quotes};
use series_store_core::{
    ReadOptions, RowSet, StoreError, VersionHandle, WriteOptions, metadata::write_mode::WriteMode,
};
use tempfile::TempDir;

#[tokio::test]
async fn as_of_returns_what_was_read_right_after_each_write() -> TestResult {
    let tmp = TempDir::new()?;
    let store = local_store(&tmp, "").await?;

    let writes: Vec<(Vec<_>, WriteMode)> = vec![
        (quotes(4..=8, 1.0), WriteMode::Write),
        (quotes(9..=10, 1.0), WriteMode::Append),
        (quotes(5..=6, 3.0), WriteMode::Update),
        (quotes([11], 1.0), WriteMode::Append),
        (quotes(8..=11, 7.0), WriteMode::Update),
        (quotes(20..=21, 1.0), WriteMode::Write),
    ];

    let mut seen: Vec<(VersionHandle, RowSet)> = Vec::new();
    for (rows, mode) in writes {
        let handle = store.write("k", rows, WriteOptions::mode(mode)).await?;
        let snapshot = store.read("k", ReadOptions::default()).await?;
        seen.push((handle, snapshot));
    }

    for (i, (handle, snapshot)) in seen.iter().enumerate() {
        // Exactly at the creation time.
        let at = store
            .read("k", ReadOptions::default().as_of(handle.created_at))
            .await?;
        assert_eq!(&at, snapshot, "version {}", handle.version);

        // Strictly between this version and the next.
        let between = match seen.get(i + 1) {
            Some((next, _)) => handle.created_at + (next.created_at - handle.created_at) / 2,
            None => handle.created_at + TimeDelta::days(365),
        };
        let mid = store.read("k", ReadOptions::default().as_of(between)).await?;
        assert_eq!(&mid, snapshot, "between version {} and the next", handle.version);
    }

    let first = &seen[0].0;
    let err = store
        .read(
            "k",
            ReadOptions::default().as_of(first.created_at - TimeDelta::nanoseconds(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NoVersionAtTime { .. }));
    Ok(())
}

#[tokio::test]
async fn as_of_combines_with_range_and_fields() -> TestResult {
    let tmp = TempDir::new()?;
    let store = local_store(&tmp, "").await?;
    let v1 = store
        .write("k", quotes(4..=8, 1.0), WriteOptions::default())
        .await?;
    store
        .write("k", quotes(5..=6, 10.0), WriteOptions::mode(WriteMode::Update))
        .await?;

    let got = store
        .read(
            "k",
            ReadOptions::default()
                .as_of(v1.created_at)
                .range(Some(day(5)), Some(day(6)))
                .fields(["ask"]),
        )
        .await?;
    assert_eq!(got.fields(), ["ask".to_string()]);
    let asks: Vec<Option<f64>> = got.rows().iter().map(|r| r.get("ask")).collect();
    assert_eq!(asks, vec![Some(6.0), Some(7.0)]);
    assert!(got.rows().iter().all(|r| r.get("bid").is_none()));
    Ok(())
}
