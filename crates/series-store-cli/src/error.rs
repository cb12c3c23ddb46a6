use std::path::PathBuf;

use arrow::error::ArrowError;
use series_store_core::{StoreError, query::QueryParseError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to open store {spec}: {source}"))]
    OpenStore {
        spec: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("{mode} to key {key:?} failed: {source}"))]
    WriteKey {
        mode: String,
        key: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Read of key {key:?} failed: {source}"))]
    ReadKey {
        key: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Listing {what} failed: {source}"))]
    List {
        what: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Input file not found or not readable: {}", path.display()))]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{}:{line}: {message}", path.display()))]
    InvalidRow {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[snafu(display("Invalid time {input:?}: expected RFC 3339 or YYYY-MM-DD"))]
    InvalidTime { input: String },

    #[snafu(display("Invalid --filter {expr:?}: {source}"))]
    InvalidFilter {
        expr: String,
        source: QueryParseError,
    },

    #[snafu(display("Failed to encode rows: {source}"))]
    Arrow { source: ArrowError },

    #[snafu(display("Failed to write {}: {source}", path.display()))]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write to stdout: {source}"))]
    Stdout { source: std::io::Error },
}
