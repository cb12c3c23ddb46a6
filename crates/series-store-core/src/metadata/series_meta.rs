//! Materialized per-key metadata carried on every commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a key after a commit has been applied.
///
/// Each commit records the full value (not a delta), so the latest version's
/// span and field set are known without reading any segment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesMeta {
    /// Field names present in this version, sorted lexicographically.
    pub fields: Vec<String>,

    /// Earliest row timestamp (inclusive).
    pub ts_min: DateTime<Utc>,

    /// Latest row timestamp (inclusive).
    pub ts_max: DateTime<Utc>,

    /// Number of rows in the materialized version.
    pub row_count: u64,

    /// Oldest version that is still readable. Raised by pruning.
    pub retained_from: u64,
}

impl SeriesMeta {
    /// Whether `fields` names exactly the same set of fields as this version.
    ///
    /// Both sides are expected to be sorted.
    pub fn same_fields(&self, fields: &[String]) -> bool {
        self.fields == fields
    }

    /// Whether `[ts_min, ts_max]` lies entirely inside this version's span.
    pub fn contains_span(&self, ts_min: DateTime<Utc>, ts_max: DateTime<Utc>) -> bool {
        self.ts_min <= ts_min && ts_max <= self.ts_max
    }

    /// Whether `name` is one of this version's fields.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.binary_search_by(|f| f.as_str().cmp(name)).is_ok()
    }
}
