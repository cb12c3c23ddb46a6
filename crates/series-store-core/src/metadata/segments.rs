//! Segment identifiers, formats, and per-file metadata recorded in commits.
//!
//! This module contains **pure** data types. Anything that reads or writes
//! segment bytes lives in `formats::parquet` and `store`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a physical segment file.
///
/// The file path is stored separately in [`SegmentMeta`]; the newtype keeps
/// segment ids from being mixed up with other strings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Supported on-disk file formats for segments.
///
/// JSON layout example: `"format": "parquet"`
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Apache Parquet columnar format.
    #[default]
    Parquet,
}

/// How a segment combines with the state of the previous version.
///
/// JSON layout example: `"overlay": "append"`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    /// The segment is the complete state; nothing below it is needed.
    Replace,
    /// Rows are concatenated after the previous state.
    Append,
    /// Rows in `[ts_min, ts_max]` of the previous state are swapped for the
    /// segment rows.
    Update,
}

impl OverlayKind {
    /// True when the segment alone materializes its version.
    pub fn is_base(self) -> bool {
        matches!(self, OverlayKind::Replace)
    }
}

/// Metadata about a single segment file. Every version owns exactly one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Logical identifier for this segment.
    pub segment_id: SegmentId,

    /// File path relative to the key root (for example, `"data/seg-<hex>.parquet"`).
    pub path: String,

    /// File format for this segment.
    pub format: FileFormat,

    /// How this segment layers on the previous version.
    pub overlay: OverlayKind,

    /// Minimum timestamp contained in this segment (inclusive), in RFC3339 UTC.
    pub ts_min: DateTime<Utc>,

    /// Maximum timestamp contained in this segment (inclusive), in RFC3339 UTC.
    pub ts_max: DateTime<Utc>,

    /// Number of rows in this segment.
    pub row_count: u64,

    /// Optional file size in bytes at the time metadata was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl SegmentMeta {
    /// Whether any row of this segment can fall inside `[start, end]`.
    ///
    /// Open bounds (`None`) are unbounded.
    pub fn overlaps(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
        start.is_none_or(|s| self.ts_max >= s) && end.is_none_or(|e| self.ts_min <= e)
    }
}

/// Derive a segment id.
///
/// Hashes the key, the version the segment belongs to, a per-attempt `nonce`
/// and the encoded bytes. Two writers racing for the same version with the
/// same rows therefore never share a segment path, so the loser can remove
/// its own file without touching the winner's. The id is `seg-` followed by
/// 32 hex chars of the BLAKE3 digest.
pub fn segment_id_v1(key: &str, version: u64, nonce: &[u8], data: &[u8]) -> SegmentId {
    let mut h = blake3::Hasher::new();
    h.update(b"segment-id-v1");
    h.update(b"\0");
    h.update(key.as_bytes());
    h.update(b"\0");
    h.update(&version.to_be_bytes());
    h.update(b"\0");
    h.update(nonce);
    h.update(b"\0");
    h.update(data);
    let hex = h.finalize().to_hex();
    SegmentId(format!("seg-{}", &hex[..32]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seg(ts_min: i64, ts_max: i64) -> SegmentMeta {
        SegmentMeta {
            segment_id: SegmentId("seg-test".to_string()),
            path: "data/seg-test.parquet".to_string(),
            format: FileFormat::Parquet,
            overlay: OverlayKind::Append,
            ts_min: Utc.timestamp_opt(ts_min, 0).single().unwrap(),
            ts_max: Utc.timestamp_opt(ts_max, 0).single().unwrap(),
            row_count: 1,
            file_size: None,
        }
    }

    fn t(secs: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0).single()
    }

    #[test]
    fn overlap_is_inclusive_at_both_ends() {
        let s = seg(10, 20);
        assert!(s.overlaps(None, None));
        assert!(s.overlaps(t(20), None));
        assert!(s.overlaps(None, t(10)));
        assert!(s.overlaps(t(12), t(15)));
        assert!(!s.overlaps(t(21), None));
        assert!(!s.overlaps(None, t(9)));
    }

    #[test]
    fn segment_id_is_stable_and_scoped() {
        let a = segment_id_v1("k", 1, b"n1", b"bytes");
        assert_eq!(a, segment_id_v1("k", 1, b"n1", b"bytes"));
        assert_ne!(a, segment_id_v1("k", 2, b"n1", b"bytes"));
        assert_ne!(a, segment_id_v1("other", 1, b"n1", b"bytes"));
        assert_ne!(a, segment_id_v1("k", 1, b"n2", b"bytes"));
        assert!(a.0.starts_with("seg-"));
        assert_eq!(a.0.len(), 4 + 32);
    }

    #[test]
    fn overlay_serializes_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&OverlayKind::Update)?, "\"update\"");
        let back: OverlayKind = serde_json::from_str("\"replace\"")?;
        assert!(back.is_base());
        Ok(())
    }
}
