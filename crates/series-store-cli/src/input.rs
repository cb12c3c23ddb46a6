//! JSON-lines row input and time arguments.
//!
//! One object per line: `{"ts": "2021-01-04T00:00:00Z", "bid": 1.22, "ask": 1.23}`.
//! `ts` is required; every other member is a field and must be a number or
//! `null` (absent). Blank lines are skipped.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use series_store_core::Row;
use snafu::ResultExt;

use crate::error::{CliResult, InvalidRowSnafu, InvalidTimeSnafu, ReadInputSnafu};

/// Parse an RFC 3339 instant or a bare date (midnight UTC).
pub fn parse_time(input: &str) -> CliResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| InvalidTimeSnafu { input }.build())
}

fn parse_row(object: Map<String, Value>) -> Result<Row, String> {
    let mut ts = None;
    let mut values = Vec::new();
    for (name, value) in object {
        if name == "ts" {
            let Value::String(text) = value else {
                return Err("\"ts\" must be a string".to_string());
            };
            ts = Some(parse_time(&text).map_err(|e| e.to_string())?);
            continue;
        }
        match value {
            Value::Null => {}
            Value::Number(n) => {
                let v = n
                    .as_f64()
                    .ok_or_else(|| format!("field {name:?} is not representable as f64"))?;
                values.push((name, v));
            }
            other => return Err(format!("field {name:?} must be a number, found {other}")),
        }
    }

    let ts = ts.ok_or_else(|| "missing \"ts\"".to_string())?;
    Ok(values
        .into_iter()
        .fold(Row::new(ts), |row, (name, v)| row.with(name, v)))
}

/// Parse JSON-lines text. `path` only labels errors.
pub fn parse_rows(path: &Path, text: &str) -> CliResult<Vec<Row>> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let invalid = |message: String| {
            InvalidRowSnafu {
                path,
                line: i + 1,
                message,
            }
            .build()
        };
        let object = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(invalid("expected a JSON object".to_string())),
            Err(e) => return Err(invalid(e.to_string())),
        };
        rows.push(parse_row(object).map_err(invalid)?);
    }
    Ok(rows)
}

/// Read and parse a JSON-lines file.
pub fn read_rows(path: &Path) -> CliResult<Vec<Row>> {
    let text = std::fs::read_to_string(path).context(ReadInputSnafu { path })?;
    parse_rows(path, &text)
}
