//! The per-key commit log under `_series_log/`.
//!
//! Version `n` of a key is the file `_series_log/<n, zero padded>.json`;
//! `CURRENT` names the newest published version and is absent for a key that
//! was never written. Commit files are created exactly once, which makes them
//! the only cross-process guard: a writer that loses the race for version `n`
//! gets an error and must re-validate against the new latest version before
//! trying again. Which actions go into a commit is decided by the store.

use chrono::{DateTime, Utc};
use log::debug;
use snafu::prelude::*;

use crate::metadata::write_mode::WriteMode;
use crate::storage::{self, StorageError, StorageLocation, layout};
use crate::transaction_log::{
    CommitError, ConflictSnafu, CorruptStateSnafu, StorageSnafu,
    actions::{Commit, LogAction},
};

/// Commit log of one key, rooted at the key's directory.
#[derive(Debug, Clone)]
pub struct TransactionLogStore {
    location: StorageLocation,
}

impl TransactionLogStore {
    /// Log rooted at a key directory.
    pub fn new(location: StorageLocation) -> Self {
        Self { location }
    }

    /// The key root this log lives under.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Read and parse commit `version`.
    ///
    /// A commit file that does not parse is `CorruptState`; IO failures
    /// (including a missing file) are `Storage`.
    pub async fn load_commit(&self, version: u64) -> Result<Commit, CommitError> {
        let rel = layout::commit_rel_path(version);
        let json = storage::read_to_string(&self.location, &rel)
            .await
            .context(StorageSnafu)?;
        serde_json::from_str(&json).map_err(|e| {
            CorruptStateSnafu {
                msg: format!("commit {version} is not a valid commit: {e}"),
            }
            .build()
        })
    }

    /// Newest published version, or 0 for a key that was never written.
    pub async fn load_current_version(&self) -> Result<u64, CommitError> {
        match storage::read_to_string(&self.location, &layout::current_rel_path()).await {
            Ok(text) => parse_current(&text),
            Err(StorageError::NotFound { .. }) => Ok(0),
            Err(source) => Err(CommitError::Storage { source }),
        }
    }

    /// Publish `actions` as version `expected + 1`.
    ///
    /// Returns `Conflict` when `CURRENT` has already moved past `expected`.
    /// That check is only a fast path: two writers can both pass it, and the
    /// create-only write of the commit file then lets exactly one through.
    /// The other sees `Storage(AlreadyExists)`. Neither outcome is worth
    /// retrying unchanged, because the caller validated its rows against a
    /// version that is no longer the latest.
    ///
    /// `CURRENT` is replaced only after the commit file is durable. If that
    /// last step fails, the commit file stays invisible to readers and the
    /// next writer for the same version loses to it; the key needs repair by
    /// rewriting `CURRENT`.
    pub async fn commit_with_expected_version(
        &self,
        expected: u64,
        timestamp: DateTime<Utc>,
        operation: WriteMode,
        actions: Vec<LogAction>,
    ) -> Result<u64, CommitError> {
        let found = self.load_current_version().await?;
        ensure!(found == expected, ConflictSnafu { expected, found });

        let version = expected.checked_add(1).context(CorruptStateSnafu {
            msg: format!("no version after {expected}"),
        })?;
        let commit = Commit {
            version,
            base_version: expected,
            timestamp,
            operation,
            actions,
        };
        let json = serde_json::to_vec(&commit).map_err(|e| {
            CorruptStateSnafu {
                msg: format!("cannot encode commit {version}: {e}"),
            }
            .build()
        })?;

        // Winner takes the version.
        storage::write_new(&self.location, &layout::commit_rel_path(version), &json)
            .await
            .context(StorageSnafu)?;
        storage::write_atomic(
            &self.location,
            &layout::current_rel_path(),
            format!("{version}\n").as_bytes(),
        )
        .await
        .context(StorageSnafu)?;

        debug!("Published {operation} version {version} at {}", self.location);
        Ok(version)
    }

    /// Delete the commit file for `version`.
    ///
    /// Only pruning calls this, and only for versions below the retention
    /// floor recorded by a later, already durable commit.
    pub async fn delete_commit(&self, version: u64) -> Result<(), CommitError> {
        storage::delete(&self.location, &layout::commit_rel_path(version))
            .await
            .context(StorageSnafu)
    }
}

/// `CURRENT` holds one decimal version number, surrounding whitespace
/// allowed.
fn parse_current(text: &str) -> Result<u64, CommitError> {
    let trimmed = text.trim();
    ensure!(
        !trimmed.is_empty(),
        CorruptStateSnafu {
            msg: "CURRENT is empty",
        }
    );
    trimmed.parse::<u64>().map_err(|e| {
        CorruptStateSnafu {
            msg: format!("CURRENT holds {trimmed:?}, not a version number: {e}"),
        }
        .build()
    })
}
