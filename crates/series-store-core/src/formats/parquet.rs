//! Parquet segment encoding and decoding.
//!
//! A segment holds one version's rows:
//! - `ts`: `Timestamp(Nanosecond, "UTC")`, non-null, strictly increasing;
//! - one nullable `Float64` column per field, in lexicographic order.
//!
//! Decoding takes a [`SegmentScan`] describing an optional inclusive time
//! window and an optional column subset. With a window, row groups whose
//! `ts` statistics miss it are skipped and each batch is filtered with
//! Arrow's scalar comparison kernels before rows are built. With a column
//! subset, only those columns (plus `ts`) are decoded.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, RecordBatch, Scalar, TimestampNanosecondArray,
};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::{boolean as boolean_kernels, cmp as cmp_kernels};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parquet::arrow::{
    ArrowWriter, ProjectionMask,
    arrow_reader::{ArrowReaderMetadata, ParquetRecordBatchReaderBuilder},
};
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::statistics::Statistics;
use snafu::{Backtrace, prelude::*};

use crate::rows::{Row, RowSet, TIME_COLUMN};

/// Timezone recorded on the `ts` column.
pub const TIME_ZONE: &str = "UTC";

/// Errors raised while encoding or decoding a segment.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SegmentError {
    /// Building the Arrow batch for a segment failed.
    #[snafu(display("Arrow error while encoding segment: {source}"))]
    ArrowEncode {
        /// Underlying Arrow error.
        source: ArrowError,
        /// Diagnostic backtrace for this error.
        backtrace: Backtrace,
    },

    /// Writing Parquet bytes failed.
    #[snafu(display("Parquet write error: {source}"))]
    ParquetWrite {
        /// Underlying parquet error.
        source: ParquetError,
        /// Diagnostic backtrace for this error.
        backtrace: Backtrace,
    },

    /// Reading Parquet metadata or data failed.
    #[snafu(display("Error reading Parquet segment at {path}: {source}"))]
    ParquetRead {
        /// Segment path relative to the key root.
        path: String,
        /// Underlying parquet error.
        source: ParquetError,
        /// Diagnostic backtrace for this error.
        backtrace: Backtrace,
    },

    /// Arrow decode or filter failure.
    #[snafu(display("Arrow read error for segment at {path}: {source}"))]
    ArrowRead {
        /// Segment path relative to the key root.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
        /// Diagnostic backtrace for this error.
        backtrace: Backtrace,
    },

    /// The segment has no `ts` column.
    #[snafu(display("Missing time column {TIME_COLUMN:?} in segment at {path}"))]
    MissingTimeColumn {
        /// Segment path relative to the key root.
        path: String,
    },

    /// A column has a type this format never writes.
    #[snafu(display("Unsupported column {column} with type {datatype:?} in segment at {path}"))]
    UnsupportedColumn {
        /// Segment path relative to the key root.
        path: String,
        /// Offending column.
        column: String,
        /// Arrow type found.
        datatype: DataType,
    },
}

/// What part of a segment to decode.
#[derive(Clone, Copy, Debug, Default)]
pub struct SegmentScan<'a> {
    /// Inclusive lower bound on `ts`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `ts`.
    pub end: Option<DateTime<Utc>>,
    /// Fields to decode. `None` decodes every field in the file.
    pub fields: Option<&'a [String]>,
}

impl SegmentScan<'_> {
    /// Decode everything.
    pub fn full() -> Self {
        SegmentScan::default()
    }
}

fn segment_schema(fields: &[String]) -> Schema {
    let mut columns = Vec::with_capacity(fields.len() + 1);
    columns.push(Field::new(
        TIME_COLUMN,
        DataType::Timestamp(TimeUnit::Nanosecond, Some(TIME_ZONE.into())),
        false,
    ));
    columns.extend(
        fields
            .iter()
            .map(|name| Field::new(name, DataType::Float64, true)),
    );
    Schema::new(columns)
}

fn to_nanos(ts: DateTime<Utc>) -> i64 {
    // RowSet validation guarantees every stored timestamp fits.
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Arrow form of a row-set, with the segment schema. Absent values are nulls.
pub fn to_record_batch(rows: &RowSet) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(segment_schema(rows.fields()));

    let ts_values: Vec<i64> = rows.rows().iter().map(|r| to_nanos(r.ts)).collect();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(rows.fields().len() + 1);
    columns.push(Arc::new(
        TimestampNanosecondArray::from(ts_values).with_timezone(TIME_ZONE),
    ));
    for field in rows.fields() {
        let values: Float64Array = rows.rows().iter().map(|r| r.get(field)).collect();
        columns.push(Arc::new(values));
    }

    RecordBatch::try_new(schema, columns)
}

/// Encode a row-set into Parquet bytes.
pub fn encode_segment(rows: &RowSet) -> Result<Vec<u8>, SegmentError> {
    let batch = to_record_batch(rows).context(ArrowEncodeSnafu)?;
    let schema = batch.schema();

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buf, schema, Some(props)).context(ParquetWriteSnafu)?;
    writer.write(&batch).context(ParquetWriteSnafu)?;
    writer.close().context(ParquetWriteSnafu)?;

    Ok(buf)
}

/// Keep rows of `batch` with `start <= ts <= end`.
///
/// Bounds are 1-element arrays carrying the column's timezone, wrapped as
/// `Scalar`s so the comparison kernels broadcast them without allocating
/// full-length bound arrays. Null mask slots drop the row.
fn filter_ts_batch(
    path: &str,
    batch: &RecordBatch,
    ts: &TimestampNanosecondArray,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<RecordBatch, SegmentError> {
    let tz = match ts.data_type() {
        DataType::Timestamp(_, tz) => tz.clone(),
        _ => None,
    };
    let bound = |v: i64| {
        Scalar::new(TimestampNanosecondArray::from(vec![v]).with_timezone_opt(tz.clone()))
    };

    let mut mask: Option<BooleanArray> = None;
    if let Some(start) = start {
        let ge = cmp_kernels::gt_eq(ts, &bound(start)).context(ArrowReadSnafu { path })?;
        mask = Some(ge);
    }
    if let Some(end) = end {
        let le = cmp_kernels::lt_eq(ts, &bound(end)).context(ArrowReadSnafu { path })?;
        mask = Some(match mask {
            Some(ge) => boolean_kernels::and(&ge, &le).context(ArrowReadSnafu { path })?,
            None => le,
        });
    }

    match mask {
        Some(mask) => filter_record_batch(batch, &mask).context(ArrowReadSnafu { path }),
        None => Ok(batch.clone()),
    }
}

/// Row groups whose `ts` statistics may intersect `[start, end]`.
///
/// Row groups without usable statistics are always kept.
fn row_groups_for_window(
    metadata: &ArrowReaderMetadata,
    ts_idx: usize,
    start: Option<i64>,
    end: Option<i64>,
) -> Vec<usize> {
    metadata
        .metadata()
        .row_groups()
        .iter()
        .enumerate()
        .filter(|(_, rg)| match rg.column(ts_idx).statistics() {
            Some(Statistics::Int64(stats)) => {
                let below = matches!((stats.max_opt(), start), (Some(max), Some(s)) if *max < s);
                let above = matches!((stats.min_opt(), end), (Some(min), Some(e)) if *min > e);
                !below && !above
            }
            _ => true,
        })
        .map(|(i, _)| i)
        .collect()
}

/// Decode (part of) a segment into a row-set.
///
/// `path` is only used for error messages. The returned row-set carries the
/// requested fields (or every field in the file) even when no row matches.
/// Requested fields missing from the file are carried with no values.
pub fn decode_segment(
    path: &str,
    data: Vec<u8>,
    scan: &SegmentScan<'_>,
) -> Result<RowSet, SegmentError> {
    let data = Bytes::from(data);
    let metadata = ArrowReaderMetadata::load(&data, Default::default()).context(ParquetReadSnafu {
        path,
    })?;

    let schema = metadata.schema().clone();
    let ts_idx = schema
        .index_of(TIME_COLUMN)
        .map_err(|_| MissingTimeColumnSnafu { path }.build())?;
    match schema.field(ts_idx).data_type() {
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {}
        other => {
            return UnsupportedColumnSnafu {
                path,
                column: TIME_COLUMN,
                datatype: other.clone(),
            }
            .fail();
        }
    }

    let file_fields: Vec<String> = schema
        .fields()
        .iter()
        .filter(|f| f.name() != TIME_COLUMN)
        .map(|f| f.name().to_string())
        .collect();
    let wanted: Vec<String> = match scan.fields {
        Some(fields) => {
            let mut fields = fields.to_vec();
            fields.sort();
            fields.dedup();
            fields
        }
        None => file_fields,
    };

    let mut roots = vec![ts_idx];
    roots.extend(wanted.iter().filter_map(|name| schema.index_of(name).ok()));
    roots.sort_unstable();
    let mask = ProjectionMask::roots(metadata.metadata().file_metadata().schema_descr(), roots);

    let start = scan.start.map(to_nanos);
    let end = scan.end.map(to_nanos);
    let row_groups = row_groups_for_window(&metadata, ts_idx, start, end);

    let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(data, metadata)
        .with_projection(mask)
        .with_row_groups(row_groups)
        .build()
        .context(ParquetReadSnafu { path })?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowReadSnafu { path })?;
        let batch_schema = batch.schema();
        let ts_col = batch_schema
            .index_of(TIME_COLUMN)
            .map_err(|_| MissingTimeColumnSnafu { path }.build())?;

        let batch = {
            let ts = batch
                .column(ts_col)
                .as_any()
                .downcast_ref::<TimestampNanosecondArray>()
                .context(UnsupportedColumnSnafu {
                    path,
                    column: TIME_COLUMN,
                    datatype: batch.column(ts_col).data_type().clone(),
                })?;
            filter_ts_batch(path, &batch, ts, start, end)?
        };
        if batch.num_rows() == 0 {
            continue;
        }

        let ts = batch
            .column(ts_col)
            .as_any()
            .downcast_ref::<TimestampNanosecondArray>()
            .context(UnsupportedColumnSnafu {
                path,
                column: TIME_COLUMN,
                datatype: batch.column(ts_col).data_type().clone(),
            })?;

        let mut value_columns = Vec::new();
        for (idx, field) in batch_schema.fields().iter().enumerate() {
            if idx == ts_col {
                continue;
            }
            let values = batch
                .column(idx)
                .as_any()
                .downcast_ref::<Float64Array>()
                .context(UnsupportedColumnSnafu {
                    path,
                    column: field.name().as_str(),
                    datatype: field.data_type().clone(),
                })?;
            value_columns.push((field.name().as_str(), values));
        }

        for i in 0..batch.num_rows() {
            let mut row = Row::new(Utc.timestamp_nanos(ts.value(i)));
            for (name, values) in &value_columns {
                if values.is_valid(i) {
                    row = row.with(*name, values.value(i));
                }
            }
            rows.push(row);
        }
    }

    Ok(RowSet::from_parts(wanted, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
    }

    fn sample() -> RowSet {
        RowSet::new(vec![
            Row::new(day(4)).with("ask", 1.5).with("bid", 1.0),
            Row::new(day(5)).with("bid", 2.0),
            Row::new(day(6)).with("ask", 3.5).with("bid", 3.0),
            Row::new(day(7)).with("ask", 4.5).with("bid", 4.0),
        ])
        .unwrap()
    }

    #[test]
    fn full_decode_restores_rows_and_nulls() -> TestResult {
        let rows = sample();
        let bytes = encode_segment(&rows)?;
        assert!(bytes.starts_with(b"PAR1"));

        let back = decode_segment("data/seg.parquet", bytes, &SegmentScan::full())?;
        assert_eq!(back, rows);
        assert_eq!(back.rows()[1].get("ask"), None);
        Ok(())
    }

    #[test]
    fn window_pushdown_is_inclusive() -> TestResult {
        let bytes = encode_segment(&sample())?;
        let scan = SegmentScan {
            start: Some(day(5)),
            end: Some(day(6)),
            fields: None,
        };
        let back = decode_segment("seg", bytes, &scan)?;
        let days: Vec<_> = back.rows().iter().map(|r| r.ts).collect();
        assert_eq!(days, vec![day(5), day(6)]);
        Ok(())
    }

    #[test]
    fn projection_decodes_only_requested_fields() -> TestResult {
        let bytes = encode_segment(&sample())?;
        let fields = vec!["bid".to_string()];
        let scan = SegmentScan {
            start: Some(day(7)),
            end: None,
            fields: Some(&fields),
        };
        let back = decode_segment("seg", bytes, &scan)?;
        assert_eq!(back.fields(), ["bid".to_string()]);
        assert_eq!(back.len(), 1);
        assert_eq!(back.rows()[0].values.len(), 1);
        assert_eq!(back.rows()[0].get("bid"), Some(4.0));
        Ok(())
    }

    #[test]
    fn window_missing_every_row_keeps_fields() -> TestResult {
        let bytes = encode_segment(&sample())?;
        let scan = SegmentScan {
            start: Some(day(20)),
            end: None,
            fields: None,
        };
        let back = decode_segment("seg", bytes, &scan)?;
        assert!(back.is_empty());
        assert_eq!(back.fields(), ["ask".to_string(), "bid".to_string()]);
        Ok(())
    }

    #[test]
    fn garbage_bytes_are_a_read_error() {
        let err = decode_segment("seg", b"not parquet".to_vec(), &SegmentScan::full())
            .expect_err("must fail");
        assert!(matches!(err, SegmentError::ParquetRead { .. }));
    }
}
