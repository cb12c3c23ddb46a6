//! Version views reconstructed from commits.
//!
//! Unlike a table that replays its whole log, every commit here already
//! carries the key's full [`SeriesMeta`], so a single commit file describes a
//! version. Materializing rows still needs the overlay chain: the commit's
//! own segment plus every segment below it down to the nearest `replace`
//! base, which [`TransactionLogStore::load_chain`] returns.
use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::metadata::{segments::SegmentMeta, series_meta::SeriesMeta, write_mode::WriteMode};
use crate::transaction_log::{
    CommitError, CorruptStateSnafu, TransactionLogStore,
    actions::{Commit, LogAction},
};

/// One committed version of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionState {
    /// Version number.
    pub version: u64,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    /// Write mode the version was requested with.
    pub operation: WriteMode,
    /// The segment committed with this version.
    pub segment: SegmentMeta,
    /// Materialized key state after this version.
    pub series: SeriesMeta,
}

impl VersionState {
    /// Build a view from a commit loaded for `version`.
    ///
    /// The payload version must match the file it was loaded from, and the
    /// commit must carry both a segment and series metadata.
    pub fn from_commit(version: u64, commit: Commit) -> Result<Self, CommitError> {
        ensure!(
            commit.version == version,
            CorruptStateSnafu {
                msg: format!(
                    "Commit version mismatch: expected {version}, found {} in payload",
                    commit.version
                ),
            }
        );

        let mut segment = None;
        let mut series = None;
        for action in commit.actions {
            match action {
                LogAction::AddSegment(meta) => segment = Some(meta),
                LogAction::UpdateSeriesMeta(meta) => series = Some(meta),
            }
        }

        Ok(VersionState {
            version,
            timestamp: commit.timestamp,
            operation: commit.operation,
            segment: segment.context(CorruptStateSnafu {
                msg: format!("commit {version} has no AddSegment action"),
            })?,
            series: series.context(CorruptStateSnafu {
                msg: format!("commit {version} has no UpdateSeriesMeta action"),
            })?,
        })
    }
}

impl TransactionLogStore {
    /// Load the view of a single version.
    pub async fn load_version_state(&self, version: u64) -> Result<VersionState, CommitError> {
        let commit = self.load_commit(version).await?;
        VersionState::from_commit(version, commit)
    }

    /// Latest committed version, or `None` for a key without commits.
    pub async fn load_latest(&self) -> Result<Option<VersionState>, CommitError> {
        match self.load_current_version().await? {
            0 => Ok(None),
            current => self.load_version_state(current).await.map(Some),
        }
    }

    /// Resolve which version a read should bind to.
    ///
    /// Without `as_of` this is the latest committed version. With `as_of` it
    /// is the latest retained version whose creation time is `<= as_of`.
    /// Returns `None` when no such version exists (including fresh keys).
    ///
    /// Creation times are strictly increasing along the log, so the search is
    /// a binary search over `[retained_from, CURRENT]`.
    pub async fn resolve_version(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<VersionState>, CommitError> {
        let Some(latest) = self.load_latest().await? else {
            return Ok(None);
        };
        match as_of {
            None => Ok(Some(latest)),
            Some(as_of) => self.resolve_as_of(latest, as_of).await,
        }
    }

    /// As-of resolution starting from an already loaded latest version.
    pub async fn resolve_as_of(
        &self,
        latest: VersionState,
        as_of: DateTime<Utc>,
    ) -> Result<Option<VersionState>, CommitError> {
        if latest.timestamp <= as_of {
            return Ok(Some(latest));
        }

        // Invariant: every version >= hi was created after as_of.
        let mut lo = latest.series.retained_from;
        let mut hi = latest.version;
        let mut found = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let state = self.load_version_state(mid).await?;
            if state.timestamp <= as_of {
                lo = mid + 1;
                found = Some(state);
            } else {
                hi = mid;
            }
        }
        Ok(found)
    }

    /// Versions needed to materialize `version`, base first.
    ///
    /// Walks down from `version` until a `replace` segment is found.
    pub async fn load_chain(&self, version: u64) -> Result<Vec<VersionState>, CommitError> {
        let mut chain = Vec::new();
        let mut v = version;
        loop {
            let state = self.load_version_state(v).await?;
            let is_base = state.segment.overlay.is_base();
            chain.push(state);
            if is_base {
                break;
            }
            ensure!(
                v > 1,
                CorruptStateSnafu {
                    msg: format!("no replace base below version {version}"),
                }
            );
            v -= 1;
        }
        chain.reverse();
        Ok(chain)
    }

    /// All retained versions, oldest first.
    pub async fn load_history(&self) -> Result<Vec<VersionState>, CommitError> {
        let Some(latest) = self.load_latest().await? else {
            return Ok(Vec::new());
        };
        let mut history = Vec::new();
        for v in latest.series.retained_from..latest.version {
            history.push(self.load_version_state(v).await?);
        }
        history.push(latest);
        Ok(history)
    }
}
