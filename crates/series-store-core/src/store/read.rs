//! Read path for `VersionedSeriesStore`.
//!
//! A read binds to one committed version before touching any segment, then
//! rebuilds that version from its overlay chain. With pushdown the chain is
//! decoded through [`SegmentScan`] (segments outside the window are skipped,
//! row groups pruned by statistics, batches filtered and columns projected);
//! without it every segment is decoded in full and filtered in memory. Both
//! paths produce the same rows.

use std::path::Path;

use log::debug;
use snafu::{Backtrace, prelude::*};

use crate::{
    error::{KeyNotFoundSnafu, NoVersionAtTimeSnafu, StoreError, StoreResult, UnknownFieldSnafu},
    formats::parquet::{SegmentScan, decode_segment},
    metadata::segments::OverlayKind,
    rows::RowSet,
    storage::{self, StorageError},
    store::{ReadOptions, VersionedSeriesStore, validate_key},
    transaction_log::{CommitError, TransactionLogStore, VersionState},
};

impl VersionedSeriesStore {
    /// Rows of one version of `key`, sorted by timestamp.
    ///
    /// Binds to the latest version, or with `as_of` to the latest version
    /// created at or before it. Fails with `KeyNotFound`, `NoVersionAtTime`,
    /// or `UnknownField` when a requested or filtered field is not part of
    /// that version. An empty window (including `start > end`) yields no rows.
    pub async fn read(&self, key: &str, opts: ReadOptions) -> StoreResult<RowSet> {
        validate_key(key)?;
        let lock = self.locks.get(key);
        let _shared = lock.prune.read().await;

        let log = self.log_for(key);
        let state = self.bind_version(key, &log, &opts).await?;
        let version = state.version;

        // 1) Every named field must exist in the bound version.
        let query = opts.query.or_else(|| self.options.query_builder.clone());
        let query_fields = query.as_ref().map(|q| q.fields()).unwrap_or_default();
        for field in opts.fields.iter().flatten().chain(&query_fields) {
            ensure!(
                state.series.has_field(field),
                UnknownFieldSnafu {
                    key,
                    field,
                    version,
                }
            );
        }

        let mut out_fields = opts
            .fields
            .clone()
            .unwrap_or_else(|| state.series.fields.clone());
        out_fields.sort();
        out_fields.dedup();

        if matches!((opts.start, opts.end), (Some(start), Some(end)) if start > end) {
            return Ok(RowSet::empty(out_fields));
        }

        // 2) Decode the chain, with or without pushdown.
        let disk_filter = opts
            .allow_disk_filter
            .unwrap_or(self.options.allow_on_disk_filter);
        let mut rows = if disk_filter {
            // Query-only fields are decoded too and dropped after filtering.
            let mut decode: Vec<String> = out_fields.iter().chain(&query_fields).cloned().collect();
            decode.sort();
            decode.dedup();
            let scan = SegmentScan {
                start: opts.start,
                end: opts.end,
                fields: opts.fields.as_ref().map(|_| decode.as_slice()),
            };
            self.materialize(key, &log, version, &scan, true).await?
        } else {
            let mut rows = self
                .materialize(key, &log, version, &SegmentScan::full(), false)
                .await?;
            rows.restrict(opts.start, opts.end);
            rows
        };

        // 3) Row filter, then the final projection.
        if let Some(query) = &query {
            rows.retain(|row| query.matches(row));
        }
        rows.project(&out_fields);

        debug!(
            "Read {} rows of {key:?} at version {version} (pushdown: {disk_filter})",
            rows.len()
        );
        Ok(rows)
    }

    async fn bind_version(
        &self,
        key: &str,
        log: &TransactionLogStore,
        opts: &ReadOptions,
    ) -> StoreResult<VersionState> {
        let to_store = |e: CommitError| StoreError::from_commit(key, None, e);
        let latest = log
            .load_latest()
            .await
            .map_err(to_store)?
            .context(KeyNotFoundSnafu { key })?;
        match opts.as_of {
            None => Ok(latest),
            Some(as_of) => log
                .resolve_as_of(latest, as_of)
                .await
                .map_err(to_store)?
                .context(NoVersionAtTimeSnafu { key, as_of }),
        }
    }

    /// Rebuild `version` from its overlay chain.
    ///
    /// With `pushdown`, segments whose span misses the scan window are not
    /// read at all. That is sound for overlays: an `append` or `update`
    /// outside the window neither adds nor removes rows inside it.
    pub(super) async fn materialize(
        &self,
        key: &str,
        log: &TransactionLogStore,
        version: u64,
        scan: &SegmentScan<'_>,
        pushdown: bool,
    ) -> StoreResult<RowSet> {
        let chain = log
            .load_chain(version)
            .await
            .map_err(|e| StoreError::from_commit(key, None, e))?;

        let mut acc = RowSet::empty(Vec::new());
        for state in chain {
            let seg = &state.segment;
            if pushdown && !seg.overlaps(scan.start, scan.end) {
                if seg.overlay.is_base() {
                    acc = RowSet::empty(Vec::new());
                }
                continue;
            }

            let data = match storage::read_all_bytes(log.location(), Path::new(&seg.path)).await {
                Ok(data) => data,
                // A committed version names this file; it is not coming back.
                Err(StorageError::NotFound { .. }) => {
                    return Err(StoreError::CorruptLog {
                        key: key.to_string(),
                        source: CommitError::CorruptState {
                            msg: format!(
                                "version {} references missing segment {}",
                                state.version, seg.path
                            ),
                            backtrace: Backtrace::capture(),
                        },
                    });
                }
                Err(e) => return Err(e.into()),
            };
            let decoded = decode_segment(&seg.path, data, scan)?;
            match seg.overlay {
                OverlayKind::Replace => acc = decoded,
                OverlayKind::Append => acc.extend_after(decoded),
                // The removal range is the segment's own span, not the
                // possibly window-trimmed rows just decoded.
                OverlayKind::Update => acc.splice_range(seg.ts_min, seg.ts_max, decoded),
            }
        }
        Ok(acc)
    }
}
