//! Writers racing on one key through separate store handles.
//!
//! Separate handles share no in-process locks, so only the commit log's
//! create-only commit files decide the winner.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{TestResult, local_store, quotes};
use series_store_core::{ReadOptions, StoreError, WriteOptions};
use tempfile::TempDir;

fn segment_files(tmp: &TempDir, key: &str) -> usize {
    let dir = tmp.path().join("default").join(key).join("data");
    std::fs::read_dir(dir)
        .map(|d| {
            d.filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == "parquet"))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_racing_writes_keep_every_key_readable() -> TestResult {
    let tmp = TempDir::new()?;
    let a = local_store(&tmp, "").await?;
    let b = local_store(&tmp, "").await?;
    let rows = quotes([4, 5, 6], 1.0);

    for i in 0..40 {
        let key = format!("k{i}");
        let (ra, rb) = tokio::join!(
            a.write(&key, rows.clone(), WriteOptions::default()),
            b.write(&key, rows.clone(), WriteOptions::default()),
        );

        let committed = match (ra, rb) {
            (Ok(x), Ok(y)) => {
                // The second writer saw the first commit and went on top.
                let mut versions = [x.version, y.version];
                versions.sort();
                assert_eq!(versions, [1, 2], "{key}");
                2
            }
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => {
                assert_eq!(won.version, 1, "{key}");
                assert!(
                    matches!(lost, StoreError::Conflict { version: 1, .. }),
                    "{key}: {lost:?}"
                );
                1
            }
            (Err(x), Err(y)) => panic!("{key}: both writers failed: {x:?} / {y:?}"),
        };

        for store in [&a, &b] {
            let got = store.read(&key, ReadOptions::default()).await?;
            assert_eq!(got.len(), 3, "{key}");
        }
        assert_eq!(a.list_versions(&key).await?.len(), committed, "{key}");
        // The loser's segment is gone, the winner's is not.
        assert_eq!(segment_files(&tmp, &key), committed, "{key}");
    }
    Ok(())
}

#[tokio::test]
async fn handles_see_each_others_commits() -> TestResult {
    let tmp = TempDir::new()?;
    let a = local_store(&tmp, "").await?;
    let b = local_store(&tmp, "").await?;

    a.write("k", quotes([4], 1.0), WriteOptions::default()).await?;
    // `b` holds no cached state, so it validates against version 1.
    let v2 = b
        .write("k", quotes([5], 1.0), WriteOptions::default())
        .await?;
    assert_eq!(v2.version, 2);

    let got = a.read("k", ReadOptions::default()).await?;
    assert_eq!(common::bids(&got), vec![(5, 5.0)]);
    Ok(())
}
