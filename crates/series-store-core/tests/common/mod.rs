//! Shared fixtures for store integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use series_store_core::{Row, RowSet, StoreResult, VersionedSeriesStore};
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
}

/// Quotes for the given January days; `bid = d * scale`, `ask = bid + 1`.
pub fn quotes(days: impl IntoIterator<Item = u32>, scale: f64) -> Vec<Row> {
    days.into_iter()
        .map(|d| {
            let bid = f64::from(d) * scale;
            Row::new(day(d)).with("bid", bid).with("ask", bid + 1.0)
        })
        .collect()
}

/// `(day of month, bid)` pairs, for compact assertions.
pub fn bids(set: &RowSet) -> Vec<(u32, f64)> {
    use chrono::Datelike;
    set.rows()
        .iter()
        .map(|r| (r.ts.day(), r.get("bid").unwrap_or(f64::NAN)))
        .collect()
}

/// Store rooted in `tmp`, with extra `name=value&...` options.
pub async fn local_store(tmp: &TempDir, options: &str) -> StoreResult<VersionedSeriesStore> {
    VersionedSeriesStore::open_str(&format!("{}?{options}", tmp.path().display())).await
}

/// Store over a fresh in-memory bucket.
pub async fn memory_store(options: &str) -> StoreResult<VersionedSeriesStore> {
    VersionedSeriesStore::open_str(&format!("memory://scratch/ticks?{options}")).await
}
