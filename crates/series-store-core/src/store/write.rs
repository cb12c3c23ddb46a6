//! Write pipeline for `VersionedSeriesStore`.
//!
//! A write is responsible for:
//! - validating the rows and the requested mode against the latest version,
//! - building the new series metadata without touching old segments,
//! - writing one segment and committing it as exactly the next version,
//! - pruning older versions once the new one is durable, when asked to.
//!
//! Keep new write-time invariants here so the flow stays in one place.

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::{
    error::{
        EmptyInputSnafu, KeyNotFoundSnafu, OverlapViolationSnafu, SchemaMismatchSnafu, StoreError,
        StoreResult,
    },
    formats::parquet::{SegmentScan, encode_segment},
    metadata::{
        segments::{FileFormat, OverlayKind, SegmentMeta, segment_id_v1},
        series_meta::SeriesMeta,
        write_mode::WriteMode,
    },
    rows::{Row, RowSet},
    storage::{self, layout},
    store::{VersionHandle, VersionedSeriesStore, WriteOptions, validate_key},
    transaction_log::{LogAction, TransactionLogStore, VersionState},
};

/// Creation time for the next version: now, unless the clock has not moved
/// past the previous version, in which case one nanosecond after it.
fn next_commit_time(previous: Option<&VersionState>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev.timestamp => prev.timestamp + TimeDelta::nanoseconds(1),
        _ => now,
    }
}

/// Attempts started by this process; part of every segment nonce.
static WRITE_ATTEMPTS: AtomicU64 = AtomicU64::new(0);

/// Bytes that differ between any two write attempts: the commit time, the
/// process id and a process-wide attempt counter.
fn attempt_nonce(created_at: DateTime<Utc>) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(24);
    nonce.extend_from_slice(&created_at.timestamp().to_be_bytes());
    nonce.extend_from_slice(&created_at.timestamp_subsec_nanos().to_be_bytes());
    nonce.extend_from_slice(&std::process::id().to_be_bytes());
    nonce.extend_from_slice(&WRITE_ATTEMPTS.fetch_add(1, Ordering::Relaxed).to_be_bytes());
    nonce
}

/// What a validated write will commit.
struct Planned {
    overlay: OverlayKind,
    rows: RowSet,
    series: SeriesMeta,
}

impl VersionedSeriesStore {
    /// Commit `rows` as the next version of `key`.
    ///
    /// - `write` replaces the key's contents (creating the key if needed).
    /// - `append` requires every row to be strictly later than the latest
    ///   version's last row.
    /// - `update` requires the rows' span to lie inside the latest version's
    ///   span and replaces exactly the rows inside that span.
    ///
    /// Append and update require an existing key with the same field set.
    /// Nothing is committed when validation fails.
    pub async fn write(
        &self,
        key: &str,
        rows: Vec<Row>,
        opts: WriteOptions,
    ) -> StoreResult<VersionHandle> {
        validate_key(key)?;
        let mode = opts.mode.unwrap_or(self.options.write_style);
        let prune = opts
            .prune_previous
            .unwrap_or(self.options.prune_previous_versions);
        let disk_filter = opts
            .allow_disk_filter
            .unwrap_or(self.options.allow_on_disk_filter);

        // 0) Input checks that need no storage access.
        ensure!(!rows.is_empty(), EmptyInputSnafu { key });
        let rows = RowSet::new(rows)?;

        let lock = self.locks.get(key);
        let _writer = lock.writer.lock().await;

        let key_root = self.key_location(key);
        let log = TransactionLogStore::new(key_root.clone());
        let latest = log
            .load_latest()
            .await
            .map_err(|e| StoreError::from_commit(key, None, e))?;

        // 1) Mode rules against the latest version.
        let mut plan = self
            .plan_write(key, &log, mode, latest.as_ref(), rows, disk_filter)
            .await?;

        let expected = latest.as_ref().map_or(0, |s| s.version);
        let version = expected + 1;

        // 2) A pruning write must be readable without anything below it.
        let prunes_history = prune && latest.is_some();
        if prunes_history && !plan.overlay.is_base() {
            plan.rows = self.materialize_after(key, &log, version, &plan, expected).await?;
            plan.overlay = OverlayKind::Replace;
        }
        if prunes_history {
            plan.series.retained_from = version;
        }

        // 3) Segment first; an orphan segment is harmless if the commit fails.
        let created_at = next_commit_time(latest.as_ref());
        let data = encode_segment(&plan.rows)?;
        let segment_id = segment_id_v1(key, version, &attempt_nonce(created_at), &data);
        let rel_path = layout::segment_rel_path(&segment_id.0);
        storage::write_atomic(&key_root, &rel_path, &data).await?;

        let segment = SegmentMeta {
            segment_id,
            path: rel_path.to_string_lossy().into_owned(),
            format: FileFormat::Parquet,
            overlay: plan.overlay,
            // Validated input is never empty.
            ts_min: plan.rows.ts_min().unwrap_or(plan.series.ts_min),
            ts_max: plan.rows.ts_max().unwrap_or(plan.series.ts_max),
            row_count: plan.rows.len() as u64,
            file_size: Some(data.len() as u64),
        };

        // 4) Commit exactly `version`.
        let actions = vec![
            LogAction::AddSegment(segment),
            LogAction::UpdateSeriesMeta(plan.series),
        ];
        if let Err(e) = log
            .commit_with_expected_version(expected, created_at, mode, actions)
            .await
        {
            remove_orphan(&log, version, &rel_path).await;
            return Err(StoreError::from_commit(key, Some(version), e));
        }
        debug!("Committed {mode} version {version} of {key:?} at {created_at}");

        // 5) Only now is it safe to drop history.
        if let Some(prev) = latest.filter(|_| prunes_history) {
            let _exclusive = lock.prune.write().await;
            prune_versions(key, &log, prev.series.retained_from, version).await;
        }

        Ok(VersionHandle {
            key: key.to_string(),
            version,
            created_at,
        })
    }

    async fn plan_write(
        &self,
        key: &str,
        log: &TransactionLogStore,
        mode: WriteMode,
        latest: Option<&VersionState>,
        rows: RowSet,
        disk_filter: bool,
    ) -> StoreResult<Planned> {
        let (Some(ts_min), Some(ts_max)) = (rows.ts_min(), rows.ts_max()) else {
            return EmptyInputSnafu { key }.fail();
        };
        let n = rows.len() as u64;

        let Some(latest) = latest else {
            ensure!(!mode.requires_existing(), KeyNotFoundSnafu { key });
            return Ok(Planned {
                overlay: OverlayKind::Replace,
                series: SeriesMeta {
                    fields: rows.fields().to_vec(),
                    ts_min,
                    ts_max,
                    row_count: n,
                    retained_from: 1,
                },
                rows,
            });
        };
        let current = &latest.series;

        if mode.requires_existing() {
            ensure!(
                current.same_fields(rows.fields()),
                SchemaMismatchSnafu {
                    key,
                    expected: current.fields.clone(),
                    found: rows.fields().to_vec(),
                }
            );
        }

        let planned = match mode {
            WriteMode::Write => Planned {
                overlay: OverlayKind::Replace,
                series: SeriesMeta {
                    fields: rows.fields().to_vec(),
                    ts_min,
                    ts_max,
                    row_count: n,
                    retained_from: current.retained_from,
                },
                rows,
            },
            WriteMode::Append => {
                ensure!(
                    ts_min > current.ts_max,
                    OverlapViolationSnafu {
                        key,
                        mode,
                        detail: format!(
                            "first row at {ts_min} is not after the last stored row at {}",
                            current.ts_max
                        ),
                    }
                );
                Planned {
                    overlay: OverlayKind::Append,
                    series: SeriesMeta {
                        fields: current.fields.clone(),
                        ts_min: current.ts_min,
                        ts_max,
                        row_count: current.row_count + n,
                        retained_from: current.retained_from,
                    },
                    rows,
                }
            }
            WriteMode::Update => {
                ensure!(
                    current.contains_span(ts_min, ts_max),
                    OverlapViolationSnafu {
                        key,
                        mode,
                        detail: format!(
                            "rows span {ts_min}..={ts_max}, outside the stored span {}..={}",
                            current.ts_min, current.ts_max
                        ),
                    }
                );
                let replaced = self
                    .count_rows(key, log, latest.version, ts_min, ts_max, disk_filter)
                    .await?;
                Planned {
                    overlay: OverlayKind::Update,
                    series: SeriesMeta {
                        fields: current.fields.clone(),
                        ts_min: current.ts_min,
                        ts_max: current.ts_max,
                        row_count: current.row_count - replaced + n,
                        retained_from: current.retained_from,
                    },
                    rows,
                }
            }
        };
        Ok(planned)
    }

    /// Rows of `version` with `start <= ts <= end`.
    async fn count_rows(
        &self,
        key: &str,
        log: &TransactionLogStore,
        version: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        disk_filter: bool,
    ) -> StoreResult<u64> {
        let set = if disk_filter {
            // Only the time column is needed to count.
            let scan = SegmentScan {
                start: Some(start),
                end: Some(end),
                fields: Some(&[]),
            };
            self.materialize(key, log, version, &scan, true).await?
        } else {
            let mut set = self
                .materialize(key, log, version, &SegmentScan::full(), false)
                .await?;
            set.restrict(Some(start), Some(end));
            set
        };
        Ok(set.len() as u64)
    }

    /// Full state of the key once `plan` is applied on top of `expected`.
    async fn materialize_after(
        &self,
        key: &str,
        log: &TransactionLogStore,
        version: u64,
        plan: &Planned,
        expected: u64,
    ) -> StoreResult<RowSet> {
        let mut state = self
            .materialize(key, log, expected, &SegmentScan::full(), false)
            .await?;
        let rows = plan.rows.clone();
        match plan.overlay {
            OverlayKind::Replace => state = rows,
            OverlayKind::Append => state.extend_after(rows),
            OverlayKind::Update => {
                if let (Some(lo), Some(hi)) = (rows.ts_min(), rows.ts_max()) {
                    state.splice_range(lo, hi, rows);
                }
            }
        }
        debug!(
            "Materialized {} rows of {key:?} for self-contained version {version}",
            state.len()
        );
        Ok(state)
    }
}

/// Best-effort removal of a segment whose commit of `version` failed.
///
/// The file is kept if the commit that did land for `version` names it.
async fn remove_orphan(log: &TransactionLogStore, version: u64, rel_path: &Path) {
    let named_by_winner = matches!(
        log.load_version_state(version).await,
        Ok(winner) if Path::new(&winner.segment.path) == rel_path
    );
    if named_by_winner {
        warn!(
            "Segment {} belongs to the committed version {version}; keeping it",
            rel_path.display()
        );
        return;
    }
    if let Err(e) = storage::delete(log.location(), rel_path).await {
        warn!("Failed to remove uncommitted segment {}: {e}", rel_path.display());
    }
}

/// Drop versions `[from, until)` of a key: commit files first, then the
/// segments they referenced. Failures leave garbage but never unreadable
/// state, since `retained_from` already excludes these versions.
async fn prune_versions(key: &str, log: &TransactionLogStore, from: u64, until: u64) {
    let mut segments = Vec::new();
    for v in from..until {
        match log.load_version_state(v).await {
            Ok(state) => segments.push(state.segment.path),
            Err(e) => warn!("Pruning {key:?}: cannot load version {v}: {e}"),
        }
    }

    for v in from..until {
        if let Err(e) = log.delete_commit(v).await {
            warn!("Pruning {key:?}: failed to delete commit {v}: {e}");
        }
    }
    for path in &segments {
        if let Err(e) = storage::delete(log.location(), Path::new(path)).await {
            warn!("Pruning {key:?}: failed to delete segment {path}: {e}");
        }
    }
    info!(
        "Pruned versions {from}..{until} of {key:?} ({} segments)",
        segments.len()
    );
}
