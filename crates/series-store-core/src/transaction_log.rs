//! Per-key append-only commit log.
//!
//! Every key owns a small Delta-style log:
//!
//! - An append-only sequence of JSON commit files under `_series_log/`
//!   (for example, `_series_log/0000000001.json`), one per version.
//! - A `CURRENT` pointer holding the latest committed version.
//! - An optimistic concurrency guard: a commit names the version it was
//!   prepared against, and the commit file is created with create-only
//!   semantics so each version is written exactly once.
//! - [`VersionState`] views reconstructed from commits, plus as-of resolution
//!   and overlay-chain loading for readers.
//!
//! ## On-disk layout (per key)
//!
//! ```text
//! <encoded key>/
//!   _series_log/
//!     CURRENT                  # latest committed version (e.g. "3\n")
//!     0000000001.json          # Commit version 1
//!     0000000002.json          # Commit version 2
//!   data/
//!     seg-<hex>.parquet        # one segment per version
//! ```
//!
//! A commit file looks like:
//!
//! ```json
//! {
//!   "version": 2,
//!   "base_version": 1,
//!   "timestamp": "2021-01-08T09:30:00.000000001Z",
//!   "operation": "append",
//!   "actions": [
//!     { "AddSegment": { "segment_id": "seg-…", "path": "data/seg-….parquet",
//!                       "format": "parquet", "overlay": "append",
//!                       "ts_min": "2021-01-06T00:00:00Z", "ts_max": "2021-01-07T00:00:00Z",
//!                       "row_count": 2 } },
//!     { "UpdateSeriesMeta": { "fields": ["ask", "bid"],
//!                             "ts_min": "2021-01-04T00:00:00Z", "ts_max": "2021-01-07T00:00:00Z",
//!                             "row_count": 4, "retained_from": 1 } }
//!   ]
//! }
//! ```
//!
//! Versions are never rewritten. Pruning deletes whole commit files below the
//! retention floor, never edits surviving ones.
pub mod actions;
pub mod log_store;
pub mod version_state;

pub use actions::{Commit, LogAction};
pub use log_store::TransactionLogStore;
pub use version_state::VersionState;

use snafu::{Backtrace, prelude::*};

use crate::storage::StorageError;

/// Errors that can occur while reading or writing a commit log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommitError {
    /// The caller's expected_version does not match the CURRENT pointer.
    #[snafu(display("Commit conflict: expected version {expected}, but CURRENT is {found}"))]
    Conflict {
        /// The version the caller expected to be current.
        expected: u64,
        /// The actual current version found.
        found: u64,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Underlying storage error while working with the log or CURRENT file.
    ///
    /// Backtraces are delegated to the inner StorageError.
    #[snafu(display("Storage error while accessing commit log: {source}"))]
    Storage {
        /// Underlying storage error returned by the storage backend.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// The log or CURRENT file is in an unexpected / malformed state.
    #[snafu(display("Corrupt log state: {msg}"))]
    CorruptState {
        /// A description of the corrupt state.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}
