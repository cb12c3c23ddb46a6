//! Log actions and commit payload definitions.
//!
//! Each commit file stores a [`Commit`] containing ordered [`LogAction`]
//! values. A well-formed commit carries exactly one `AddSegment` (the version's
//! data) and one `UpdateSeriesMeta` (the key's state after the commit).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{segments::SegmentMeta, series_meta::SeriesMeta, write_mode::WriteMode};

/// An action recorded in a commit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogAction {
    /// The segment holding this version's rows.
    AddSegment(SegmentMeta),

    /// Materialized series metadata after this commit (full replacement).
    UpdateSeriesMeta(SeriesMeta),
}

/// A single, immutable commit in a key's log.
///
/// Commits are written to files such as `_series_log/0000000001.json`.
/// The version field must match the file name; `base_version` records what
/// the writer believed was the current version when the commit was prepared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// The version number of this commit (monotonic, starting from 1).
    pub version: u64,

    /// The version that the writer believed was current when preparing this
    /// commit. Used by the OCC layer as a guard.
    pub base_version: u64,

    /// Creation instant of the version, stored as RFC3339 UTC. Strictly
    /// increasing along a key's log.
    pub timestamp: DateTime<Utc>,

    /// Write mode the caller requested.
    pub operation: WriteMode,

    /// Ordered list of actions describing the version.
    pub actions: Vec<LogAction>,
}
