//! Error types and SNAFU context selectors for the store.
//!
//! `StoreError` is the single error type of the public store API. Lower
//! layers (`storage`, `transaction_log`, `formats::parquet`) keep their own
//! error enums; this module wraps them and exposes context selectors (via
//! `#[snafu(visibility(pub(crate)))]`) to the rest of the crate. Keep new
//! variants here so user-facing messages stay consistent.

use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::{
    formats::parquet::SegmentError,
    metadata::write_mode::WriteMode,
    storage::StorageError,
    transaction_log::CommitError,
};

/// Errors from store operations.
///
/// Every variant is a distinct, catchable failure scoped to a single call.
/// Use [`StoreError::is_retryable`] to decide whether retrying the same input
/// can succeed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The key is empty or otherwise unusable.
    #[snafu(display("Invalid key {key:?}: {reason}"))]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A write supplied no rows.
    #[snafu(display("Write to {key:?} has no rows"))]
    EmptyInput {
        /// Key being written.
        key: String,
    },

    /// Two input rows share a timestamp.
    #[snafu(display("Duplicate timestamp {ts} in input rows"))]
    DuplicateTimestamp {
        /// The repeated timestamp.
        ts: DateTime<Utc>,
    },

    /// A field name in the input cannot be stored.
    #[snafu(display("Invalid field name {field:?}: {reason}"))]
    InvalidField {
        /// The rejected field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A timestamp cannot be represented as i64 nanoseconds since the epoch.
    #[snafu(display("Timestamp {ts} is outside the storable range"))]
    TimestampOutOfRange {
        /// The offending timestamp.
        ts: DateTime<Utc>,
    },

    /// Append/update ordering constraints were violated.
    #[snafu(display("{mode} to {key:?} rejected: {detail}"))]
    OverlapViolation {
        /// Key being written.
        key: String,
        /// Requested write mode.
        mode: WriteMode,
        /// Which bound was violated.
        detail: String,
    },

    /// The key has no committed version.
    #[snafu(display("Key {key:?} not found"))]
    KeyNotFound {
        /// Missing key.
        key: String,
    },

    /// No retained version of the key existed at the requested instant.
    #[snafu(display("Key {key:?} has no version at or before {as_of}"))]
    NoVersionAtTime {
        /// Key being read.
        key: String,
        /// Requested as-of instant.
        as_of: DateTime<Utc>,
    },

    /// Append/update field set differs from the latest version.
    #[snafu(display(
        "Field set mismatch for {key:?}: latest version has {expected:?}, input has {found:?}"
    ))]
    SchemaMismatch {
        /// Key being written.
        key: String,
        /// Fields of the latest version.
        expected: Vec<String>,
        /// Fields of the input.
        found: Vec<String>,
    },

    /// A requested or referenced field does not exist in the resolved version.
    #[snafu(display("Unknown field {field:?} for key {key:?} at version {version}"))]
    UnknownField {
        /// Key being read.
        key: String,
        /// The unknown field.
        field: String,
        /// Version the read resolved to.
        version: u64,
    },

    /// I/O or connectivity failure against the backing medium.
    #[snafu(display("Storage unavailable: {source}"))]
    StorageUnavailable {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// Another writer committed the same version first.
    #[snafu(display("Concurrent commit on {key:?} at version {version}"))]
    Conflict {
        /// Key being written.
        key: String,
        /// The version both writers tried to create.
        version: u64,
    },

    /// The key's log could not be interpreted.
    #[snafu(display("Corrupt log for {key:?}: {source}"))]
    CorruptLog {
        /// Key whose log is corrupt.
        key: String,
        /// Underlying commit error.
        #[snafu(source, backtrace)]
        source: CommitError,
    },

    /// A segment could not be encoded or decoded.
    #[snafu(display("Segment error: {source}"))]
    Segment {
        /// Underlying segment error.
        #[snafu(source, backtrace)]
        source: SegmentError,
    },

    /// The store configuration is invalid.
    #[snafu(display("Invalid configuration {spec:?}: {reason}"))]
    InvalidConfig {
        /// The configuration string (or option) as supplied.
        spec: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl StoreError {
    /// Whether retrying the same call unchanged can succeed.
    ///
    /// Only storage outages qualify. A lost commit race was validated against
    /// a version that is no longer the latest, so the input must be checked
    /// again before it is resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable { .. })
    }

    /// Map a commit-log error for `key` into the store taxonomy.
    ///
    /// `version` is the version a writer attempted to create, when known.
    pub(crate) fn from_commit(key: &str, version: Option<u64>, err: CommitError) -> Self {
        match (err, version) {
            (CommitError::Conflict { found, .. }, version) => StoreError::Conflict {
                key: key.to_string(),
                version: version.unwrap_or(found + 1),
            },
            (
                CommitError::Storage {
                    source: StorageError::AlreadyExists { .. },
                },
                Some(version),
            ) => StoreError::Conflict {
                key: key.to_string(),
                version,
            },
            (CommitError::Storage { source }, _) => StoreError::StorageUnavailable { source },
            (err @ CommitError::CorruptState { .. }, _) => StoreError::CorruptLog {
                key: key.to_string(),
                source: err,
            },
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(source: StorageError) -> Self {
        StoreError::StorageUnavailable { source }
    }
}

impl From<SegmentError> for StoreError {
    fn from(source: SegmentError) -> Self {
        StoreError::Segment { source }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
