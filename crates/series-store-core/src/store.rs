//! The versioned series store.
//!
//! A [`VersionedSeriesStore`] owns one library inside a storage root. Every
//! key in the library has its own commit log and segment directory; the store
//! ties them together:
//!
//! - [`VersionedSeriesStore::write`] validates rows against the latest
//!   version, writes one Parquet segment and commits it as the next version
//!   (see `store/write.rs`).
//! - [`VersionedSeriesStore::read`] binds to one committed version (latest or
//!   as-of), decodes its overlay chain and filters the result (see
//!   `store/read.rs`).
//! - [`VersionedSeriesStore::list_versions`], [`VersionedSeriesStore::list_keys`]
//!   and [`VersionedSeriesStore::has_key`] answer audit questions from the log
//!   alone.
//!
//! Within one process, writers to the same key are serialized and pruning
//! excludes readers of that key. Across processes the commit log's
//! create-only commit files are the only guard.

mod locks;
mod read;
mod write;

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use snafu::prelude::*;

use crate::{
    config::{StoreConfig, StoreOptions},
    error::{InvalidConfigSnafu, InvalidKeySnafu, KeyNotFoundSnafu, StoreError, StoreResult},
    metadata::{
        library::{LIBRARY_FORMAT_VERSION, LibraryMeta},
        write_mode::WriteMode,
    },
    query::QueryBuilder,
    storage::{self, StorageError, StorageLocation, layout},
    transaction_log::TransactionLogStore,
};

use locks::KeyLocks;

/// Longest encoded key that still fits in one path component.
const MAX_ENCODED_KEY_LEN: usize = 255;

/// Identifies a newly committed version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionHandle {
    /// Key the version belongs to.
    pub key: String,
    /// Version number, starting at 1.
    pub version: u64,
    /// Creation instant, also the as-of boundary for this version.
    pub created_at: DateTime<Utc>,
}

/// One entry of [`VersionedSeriesStore::list_versions`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version number.
    pub version: u64,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Write mode that produced the version.
    pub operation: WriteMode,
    /// Rows visible in the version.
    pub row_count: u64,
}

/// Per-call write settings. Unset fields fall back to the store options.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// Write mode; defaults to `write_style`.
    pub mode: Option<WriteMode>,
    /// Discard every older version once this one commits; defaults to
    /// `prune_previous_versions`.
    pub prune_previous: Option<bool>,
    /// Use decode-time pushdown when existing data must be read; defaults to
    /// `allow_on_disk_filter`.
    pub allow_disk_filter: Option<bool>,
}

impl WriteOptions {
    /// Options with an explicit mode.
    pub fn mode(mode: WriteMode) -> Self {
        WriteOptions {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// Set `prune_previous`.
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune_previous = Some(prune);
        self
    }

    /// Set `allow_disk_filter`.
    pub fn disk_filter(mut self, allow: bool) -> Self {
        self.allow_disk_filter = Some(allow);
        self
    }
}

/// Per-call read settings.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Read the latest version created at or before this instant.
    pub as_of: Option<DateTime<Utc>>,
    /// Inclusive lower bound on row timestamps.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on row timestamps.
    pub end: Option<DateTime<Utc>>,
    /// Fields to return. `None` returns every field of the version.
    pub fields: Option<Vec<String>>,
    /// Row filter; defaults to the store's `query_builder`.
    pub query: Option<QueryBuilder>,
    /// Push range and column filters into segment decoding; defaults to
    /// `allow_on_disk_filter`.
    pub allow_disk_filter: Option<bool>,
}

impl ReadOptions {
    /// Set `as_of`.
    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Set both range bounds. Either may be open.
    pub fn range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Restrict the returned fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the row filter.
    pub fn query(mut self, query: QueryBuilder) -> Self {
        self.query = Some(query);
        self
    }

    /// Set `allow_disk_filter`.
    pub fn disk_filter(mut self, allow: bool) -> Self {
        self.allow_disk_filter = Some(allow);
        self
    }
}

/// Versioned, appendable, point-in-time queryable store of keyed series.
#[derive(Debug)]
pub struct VersionedSeriesStore {
    root: StorageLocation,
    options: StoreOptions,
    locks: KeyLocks,
}

fn validate_key(key: &str) -> StoreResult<()> {
    ensure!(
        !key.is_empty(),
        InvalidKeySnafu {
            key,
            reason: "keys must not be empty",
        }
    );
    let encoded = layout::encode_key(key).len();
    ensure!(
        encoded <= MAX_ENCODED_KEY_LEN,
        InvalidKeySnafu {
            key,
            reason: format!(
                "encoded key is {encoded} bytes, longer than {MAX_ENCODED_KEY_LEN}"
            ),
        }
    );
    Ok(())
}

impl VersionedSeriesStore {
    /// Bind to the configured library, creating it if needed.
    ///
    /// With `force_create_library` every key of the library is destroyed
    /// first and a fresh marker is written.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let StoreConfig { location, options } = config;
        let library = options.library.as_str();
        let marker_path = layout::library_marker_rel_path(library);

        if options.force_create_library {
            info!("Resetting library {library} at {location}");
            storage::delete_prefix(&location, &layout::library_rel_dir(library)).await?;
            write_marker(&location, library, &marker_path).await?;
        } else {
            match storage::read_to_string(&location, &marker_path).await {
                Ok(text) => check_marker(&location, library, &text)?,
                Err(StorageError::NotFound { .. }) => {
                    match storage::write_new(&location, &marker_path, &marker_bytes(library)?)
                        .await
                    {
                        // Another opener created it first.
                        Ok(()) | Err(StorageError::AlreadyExists { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                    info!("Created library {library} at {location}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(VersionedSeriesStore {
            root: location,
            options,
            locks: KeyLocks::default(),
        })
    }

    /// Parse a configuration string and [`open`](Self::open) it.
    pub async fn open_str(spec: &str) -> StoreResult<Self> {
        Self::open(StoreConfig::parse(spec)?).await
    }

    /// Storage root.
    pub fn location(&self) -> &StorageLocation {
        &self.root
    }

    /// Effective options.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Library name.
    pub fn library(&self) -> &str {
        &self.options.library
    }

    fn key_location(&self, key: &str) -> StorageLocation {
        self.root.child(&layout::key_rel_dir(self.library(), key))
    }

    fn log_for(&self, key: &str) -> TransactionLogStore {
        TransactionLogStore::new(self.key_location(key))
    }

    /// Every retained version of `key`, oldest first.
    pub async fn list_versions(&self, key: &str) -> StoreResult<Vec<VersionInfo>> {
        validate_key(key)?;
        let lock = self.locks.get(key);
        let _shared = lock.prune.read().await;

        let history = self
            .log_for(key)
            .load_history()
            .await
            .map_err(|e| StoreError::from_commit(key, None, e))?;
        ensure!(!history.is_empty(), KeyNotFoundSnafu { key });

        Ok(history
            .into_iter()
            .map(|state| VersionInfo {
                version: state.version,
                created_at: state.timestamp,
                operation: state.operation,
                row_count: state.series.row_count,
            })
            .collect())
    }

    /// Keys of the library with at least one committed version, sorted.
    pub async fn list_keys(&self) -> StoreResult<Vec<String>> {
        let dirs =
            storage::list_dirs(&self.root, &layout::library_rel_dir(self.library())).await?;

        let mut keys = Vec::new();
        for key in dirs.iter().filter_map(|d| layout::decode_key(d)) {
            if self.has_key(&key).await? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Whether `key` has a committed version.
    pub async fn has_key(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let current = self
            .log_for(key)
            .load_current_version()
            .await
            .map_err(|e| StoreError::from_commit(key, None, e))?;
        Ok(current > 0)
    }
}

fn marker_bytes(library: &str) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(&LibraryMeta::new(library)).map_err(|e| {
        InvalidConfigSnafu {
            spec: library,
            reason: format!("cannot encode library marker: {e}"),
        }
        .build()
    })
}

async fn write_marker(
    location: &StorageLocation,
    library: &str,
    marker_path: &Path,
) -> StoreResult<()> {
    storage::write_atomic(location, marker_path, &marker_bytes(library)?).await?;
    Ok(())
}

fn check_marker(location: &StorageLocation, library: &str, text: &str) -> StoreResult<()> {
    match serde_json::from_str::<LibraryMeta>(text) {
        Ok(meta) => ensure!(
            meta.format_version <= LIBRARY_FORMAT_VERSION,
            InvalidConfigSnafu {
                spec: format!("{location}/{library}"),
                reason: format!(
                    "library format version {} is newer than supported version {LIBRARY_FORMAT_VERSION}",
                    meta.format_version
                ),
            }
        ),
        // The marker only records provenance; key logs stay readable without it.
        Err(e) => warn!("Ignoring unreadable library marker for {library} at {location}: {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::Row;
    use chrono::TimeZone;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
    }

    async fn open_local(tmp: &TempDir) -> StoreResult<VersionedSeriesStore> {
        VersionedSeriesStore::open(StoreConfig::new(StorageLocation::local(tmp.path()))).await
    }

    #[tokio::test]
    async fn open_writes_library_marker() -> TestResult {
        let tmp = TempDir::new()?;
        let store = open_local(&tmp).await?;
        assert_eq!(store.library(), "default");

        let text = std::fs::read_to_string(tmp.path().join("default/_library.json"))?;
        let meta: LibraryMeta = serde_json::from_str(&text)?;
        assert_eq!(meta.name, "default");
        assert_eq!(meta.format_version, LIBRARY_FORMAT_VERSION);

        // Reopening keeps the existing marker.
        open_local(&tmp).await?;
        let again = std::fs::read_to_string(tmp.path().join("default/_library.json"))?;
        assert_eq!(text, again);
        Ok(())
    }

    #[tokio::test]
    async fn newer_library_format_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let mut meta = LibraryMeta::new("default");
        meta.format_version = LIBRARY_FORMAT_VERSION + 1;
        std::fs::create_dir_all(tmp.path().join("default"))?;
        std::fs::write(
            tmp.path().join("default/_library.json"),
            serde_json::to_vec(&meta)?,
        )?;

        let err = open_local(&tmp).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected_everywhere() -> TestResult {
        let tmp = TempDir::new()?;
        let store = open_local(&tmp).await?;
        let long = "x".repeat(MAX_ENCODED_KEY_LEN + 1);

        for key in ["", long.as_str()] {
            assert!(matches!(
                store.has_key(key).await,
                Err(StoreError::InvalidKey { .. })
            ));
            assert!(matches!(
                store.list_versions(key).await,
                Err(StoreError::InvalidKey { .. })
            ));
            assert!(matches!(
                store.read(key, ReadOptions::default()).await,
                Err(StoreError::InvalidKey { .. })
            ));
            let rows = vec![Row::new(day(4)).with("bid", 1.0)];
            assert!(matches!(
                store.write(key, rows, WriteOptions::default()).await,
                Err(StoreError::InvalidKey { .. })
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn keys_are_listed_decoded_and_sorted() -> TestResult {
        let tmp = TempDir::new()?;
        let store = open_local(&tmp).await?;
        for key in ["usd/jpy", "eur usd", "_hidden"] {
            store
                .write(key, vec![Row::new(day(4)).with("bid", 1.0)], WriteOptions::default())
                .await?;
        }
        // Stray directories are not keys.
        std::fs::create_dir_all(tmp.path().join("default/not a key"))?;

        assert_eq!(store.list_keys().await?, vec!["_hidden", "eur usd", "usd/jpy"]);
        assert!(store.has_key("eur usd").await?);
        assert!(!store.has_key("gbp").await?);
        Ok(())
    }

    #[tokio::test]
    async fn list_versions_of_unknown_key_fails() -> TestResult {
        let tmp = TempDir::new()?;
        let store = open_local(&tmp).await?;
        let err = store.list_versions("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound { .. }));
        Ok(())
    }
}
