//! Core engine for a versioned, point-in-time queryable time-series store.
//!
//! This crate provides the pieces behind the `series-store` CLI:
//!
//! - A per-key, append-only commit log with create-only commit files as the
//!   optimistic concurrency guard (`transaction_log` module).
//! - Parquet segments written once per version and layered as
//!   replace/append/update overlays (`formats` module).
//! - A [`store::VersionedSeriesStore`] that validates writes against the
//!   latest version and rebuilds any retained version on read, with optional
//!   range and column pushdown (`store` module).
//! - Storage locations over a local directory, S3 or an in-memory object
//!   store (`storage` module).
//! - Configuration strings and the row filter language (`config`, `query`).
//!
//! ```no_run
//! # async fn demo() -> series_store_core::error::StoreResult<()> {
//! use chrono::{TimeZone, Utc};
//! use series_store_core::{
//!     metadata::write_mode::WriteMode,
//!     rows::Row,
//!     store::{ReadOptions, VersionedSeriesStore, WriteOptions},
//! };
//!
//! let store = VersionedSeriesStore::open_str("/tmp/ticks?library=fx").await?;
//! let day = |d| Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap();
//!
//! store
//!     .write("EURUSD", vec![Row::new(day(4)).with("bid", 1.22)], WriteOptions::default())
//!     .await?;
//! let v2 = store
//!     .write(
//!         "EURUSD",
//!         vec![Row::new(day(5)).with("bid", 1.23)],
//!         WriteOptions::mode(WriteMode::Append),
//!     )
//!     .await?;
//!
//! let rows = store
//!     .read("EURUSD", ReadOptions::default().as_of(v2.created_at))
//!     .await?;
//! assert_eq!(rows.len(), 2);
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
pub mod config;
pub mod error;
pub mod formats;
pub mod metadata;
pub mod query;
pub mod rows;
pub mod storage;
pub mod store;
pub mod transaction_log;

pub use config::{StoreConfig, StoreOptions};
pub use error::{StoreError, StoreResult};
pub use query::QueryBuilder;
pub use rows::{Row, RowSet};
pub use store::{ReadOptions, VersionHandle, VersionInfo, VersionedSeriesStore, WriteOptions};
