//! Row and row-set model.
//!
//! A [`Row`] is one timestamped record of numeric fields; a [`RowSet`] is a
//! timestamp-ordered collection of rows together with the sorted list of
//! field names it carries. Rows may omit fields, which read back as absent.
//!
//! [`RowSet::new`] is the validating entry point used for caller input:
//! rows are sorted, duplicate timestamps are rejected, and field names and
//! timestamps are checked against what a segment can store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use snafu::prelude::*;

use crate::error::{
    DuplicateTimestampSnafu, InvalidFieldSnafu, StoreResult, TimestampOutOfRangeSnafu,
};

/// Name of the time column in segments. Not usable as a field name.
pub const TIME_COLUMN: &str = "ts";

/// One timestamped record.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Row timestamp, normalized to UTC.
    pub ts: DateTime<Utc>,
    /// Field values keyed by field name.
    pub values: BTreeMap<String, f64>,
}

impl Row {
    /// Empty row at `ts`. Any timezone is accepted and normalized to UTC.
    pub fn new<Tz: TimeZone>(ts: DateTime<Tz>) -> Self {
        Row {
            ts: ts.with_timezone(&Utc),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter for one field.
    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Value of `field`, if the row has one.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Rows sorted ascending by timestamp plus the fields they carry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSet {
    fields: Vec<String>,
    rows: Vec<Row>,
}

fn validate_field(field: &str) -> StoreResult<()> {
    ensure!(
        !field.is_empty(),
        InvalidFieldSnafu {
            field,
            reason: "field names must not be empty",
        }
    );
    ensure!(
        field != TIME_COLUMN,
        InvalidFieldSnafu {
            field,
            reason: format!("{TIME_COLUMN:?} is reserved for the time column"),
        }
    );
    Ok(())
}

impl RowSet {
    /// Validate caller-supplied rows.
    ///
    /// Rows are sorted by timestamp; the field list is the sorted union of
    /// every row's fields. Fails with `DuplicateTimestamp`, `InvalidField` or
    /// `TimestampOutOfRange`. An empty input yields an empty set.
    pub fn new(mut rows: Vec<Row>) -> StoreResult<Self> {
        rows.sort_by(|a, b| a.ts.cmp(&b.ts));

        for pair in rows.windows(2) {
            ensure!(pair[0].ts != pair[1].ts, DuplicateTimestampSnafu { ts: pair[0].ts });
        }

        let mut fields = BTreeSet::new();
        for row in &rows {
            ensure!(
                row.ts.timestamp_nanos_opt().is_some(),
                TimestampOutOfRangeSnafu { ts: row.ts }
            );
            for field in row.values.keys() {
                if !fields.contains(field.as_str()) {
                    validate_field(field)?;
                    fields.insert(field.clone());
                }
            }
        }

        Ok(RowSet {
            fields: fields.into_iter().collect(),
            rows,
        })
    }

    /// Assemble a row-set from parts already known to be valid and sorted.
    pub(crate) fn from_parts(fields: Vec<String>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0].ts < w[1].ts));
        RowSet { fields, rows }
    }

    /// Empty row-set carrying `fields`.
    pub fn empty(fields: Vec<String>) -> Self {
        RowSet {
            fields,
            rows: Vec::new(),
        }
    }

    /// Sorted field names.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Rows in timestamp order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume the set, returning its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Earliest timestamp.
    pub fn ts_min(&self) -> Option<DateTime<Utc>> {
        self.rows.first().map(|r| r.ts)
    }

    /// Latest timestamp.
    pub fn ts_max(&self) -> Option<DateTime<Utc>> {
        self.rows.last().map(|r| r.ts)
    }

    /// Keep only rows with `start <= ts <= end`. Open bounds are unbounded.
    pub fn restrict(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) {
        self.rows
            .retain(|r| start.is_none_or(|s| r.ts >= s) && end.is_none_or(|e| r.ts <= e));
    }

    /// Keep only rows for which `keep` holds.
    pub fn retain(&mut self, keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(keep);
    }

    /// Keep only the listed fields.
    pub fn project(&mut self, fields: &[String]) {
        let keep: BTreeSet<&str> = fields.iter().map(String::as_str).collect();
        for row in &mut self.rows {
            row.values.retain(|k, _| keep.contains(k.as_str()));
        }
        self.fields = keep.into_iter().map(str::to_string).collect();
    }

    /// Concatenate rows that all lie strictly after this set.
    pub(crate) fn extend_after(&mut self, other: RowSet) {
        debug_assert!(match (self.ts_max(), other.ts_min()) {
            (Some(a), Some(b)) => a < b,
            _ => true,
        });
        self.rows.extend(other.rows);
    }

    /// Replace every row with `lo <= ts <= hi` by `other`'s rows, which must
    /// lie inside the same range.
    pub(crate) fn splice_range(&mut self, lo: DateTime<Utc>, hi: DateTime<Utc>, other: RowSet) {
        let start = self.rows.partition_point(|r| r.ts < lo);
        let end = self.rows.partition_point(|r| r.ts <= hi);
        self.rows.splice(start..end, other.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use chrono::FixedOffset;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
    }

    fn row(d: u32, bid: f64) -> Row {
        Row::new(day(d)).with("bid", bid)
    }

    #[test]
    fn new_sorts_and_unions_fields() {
        let set = RowSet::new(vec![
            row(5, 2.0),
            Row::new(day(4)).with("ask", 1.5).with("bid", 1.0),
        ])
        .unwrap();

        assert_eq!(set.fields(), ["ask".to_string(), "bid".to_string()]);
        assert_eq!(set.ts_min(), Some(day(4)));
        assert_eq!(set.ts_max(), Some(day(5)));
        assert_eq!(set.rows()[1].get("ask"), None);
    }

    #[test]
    fn new_normalizes_timezones() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let local = tokyo.with_ymd_and_hms(2021, 1, 4, 9, 0, 0).unwrap();
        let set = RowSet::new(vec![Row::new(local).with("bid", 1.0)]).unwrap();
        assert_eq!(set.ts_min(), Some(day(4)));
    }

    #[test]
    fn new_rejects_duplicate_timestamps() {
        let err = RowSet::new(vec![row(4, 1.0), row(5, 1.0), row(4, 2.0)]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTimestamp { ts } if ts == day(4)));
    }

    #[test]
    fn new_rejects_reserved_and_empty_field_names() {
        let err = RowSet::new(vec![Row::new(day(4)).with("ts", 1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidField { .. }));

        let err = RowSet::new(vec![Row::new(day(4)).with("", 1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidField { .. }));
    }

    #[test]
    fn new_rejects_unrepresentable_timestamps() {
        let far = Utc.with_ymd_and_hms(2400, 1, 1, 0, 0, 0).unwrap();
        let err = RowSet::new(vec![Row::new(far).with("bid", 1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::TimestampOutOfRange { .. }));
    }

    #[test]
    fn restrict_is_inclusive() {
        let mut set = RowSet::new((4..=7).map(|d| row(d, d as f64)).collect()).unwrap();
        set.restrict(Some(day(5)), Some(day(6)));
        let days: Vec<_> = set.rows().iter().map(|r| r.ts).collect();
        assert_eq!(days, vec![day(5), day(6)]);

        set.restrict(Some(day(7)), Some(day(4)));
        assert!(set.is_empty());
    }

    #[test]
    fn project_drops_other_fields() {
        let mut set =
            RowSet::new(vec![Row::new(day(4)).with("ask", 1.5).with("bid", 1.0)]).unwrap();
        set.project(&["bid".to_string()]);
        assert_eq!(set.fields(), ["bid".to_string()]);
        assert_eq!(set.rows()[0].values.len(), 1);
    }

    #[test]
    fn splice_range_replaces_only_the_covered_rows() {
        let mut set = RowSet::new((4..=8).map(|d| row(d, 1.0)).collect()).unwrap();
        let update = RowSet::new(vec![row(5, 10.0), row(7, 30.0)]).unwrap();

        set.splice_range(day(5), day(7), update);

        let got: Vec<_> = set.rows().iter().map(|r| (r.ts, r.get("bid"))).collect();
        assert_eq!(
            got,
            vec![
                (day(4), Some(1.0)),
                (day(5), Some(10.0)),
                (day(7), Some(30.0)),
                (day(8), Some(1.0)),
            ]
        );
    }

    #[test]
    fn extend_after_concatenates() {
        let mut set = RowSet::new(vec![row(4, 1.0)]).unwrap();
        set.extend_after(RowSet::new(vec![row(6, 2.0)]).unwrap());
        assert_eq!(set.len(), 2);
    }
}
