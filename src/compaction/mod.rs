//! # Compaction
//!
//! Implements automatic **L0 → L1 compaction**. Once L0 accumulates
//! [`L0_COMPACTION_THRESHOLD`] SSTables, they are merged ascending by key
//! into a single new L1 SSTable:
//!
//! - Point entries are deduplicated — the highest-LSN version of each key
//!   wins.
//! - Tombstones (point and range) are **preserved** unless they are older
//!   than the configured TTL, since L1 may still hold data an unexpired
//!   tombstone needs to cover. A full-dataset merge could drop every
//!   tombstone unconditionally; an L0-only merge cannot.
//!
//! ## Crash safety
//!
//! The manifest records the operation as a sequence of durable events:
//! `CompactionStart` → `SstSeal` (the new L1 table) → `SstDelete` for each
//! consumed input → `CompactionEnd`. Input files are only removed from disk
//! after their `SstDelete` event is durable, so a crash at any point leaves
//! enough information on disk to redo or resume: if `SstSeal` never landed,
//! the inputs are untouched and compaction simply restarts; if some
//! `SstDelete`s landed but not all, the remaining inputs are still safe to
//! delete because the L1 output is already durable.

use crate::engine::utils::Record;
use crate::engine::{RangeTombstone, SST_L1_DIR};
pub use crate::engine::utils::MergeIterator;
use crate::sstable::{self, PointEntry, SSTable, SSTableError};

use crate::manifest::{Manifest, ManifestError, ManifestSstEntry};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Number of L0 SSTables that triggers automatic compaction.
pub const L0_COMPACTION_THRESHOLD: usize = 4;

/// Default tombstone time-to-live: 24 hours.
pub const DEFAULT_TOMBSTONE_TTL_SECS: u64 = 24 * 60 * 60;

/// Result of a compaction execution — enough information to update the
/// in-memory SSTable list.
pub struct CompactionResult {
    /// SSTable IDs that were consumed (already removed from the manifest).
    pub removed_ids: Vec<u64>,

    /// Paths of the newly built L1 SSTable(s). Empty when every input
    /// entry was eliminated (all tombstones expired, nothing survived).
    pub new_sst_paths: Vec<String>,

    /// IDs allocated for the newly built SSTable(s), parallel to
    /// `new_sst_paths`.
    pub new_sst_ids: Vec<u64>,
}

/// Unified error type for compaction.
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks whether L0 has reached `threshold` SSTables, and if so merges
/// all of them into a single new L1 SSTable.
///
/// Returns `Ok(None)` if L0 has fewer than `threshold` SSTables.
pub fn maybe_compact_l0(
    sstables: &[SSTable],
    manifest: &Manifest,
    data_dir: &str,
    tombstone_ttl_secs: u64,
    threshold: usize,
) -> Result<Option<CompactionResult>, CompactionError> {
    let l0: Vec<&SSTable> = sstables.iter().filter(|s| s.level == 0).collect();
    if l0.len() < threshold {
        debug!(l0_count = l0.len(), threshold, "L0 compaction: below threshold");
        return Ok(None);
    }

    let input_ids: Vec<u64> = l0.iter().map(|s| s.id).collect();
    info!(?input_ids, "L0 compaction: starting merge");
    manifest.append_compaction_start(1, input_ids.clone())?;

    let other: Vec<&SSTable> = sstables.iter().filter(|s| s.level != 0).collect();

    let iters = full_range_scan_iters(&l0)?;
    let merge_iter = MergeIterator::new(iters);
    let (point_entries, range_tombstones) = dedup_records(merge_iter, tombstone_ttl_secs, &other);

    let result = finalize_compaction(
        manifest,
        data_dir,
        &l0,
        input_ids,
        point_entries,
        range_tombstones,
    )?;

    info!(
        new_ids = ?result.new_sst_ids,
        removed_count = result.removed_ids.len(),
        "L0 compaction: complete"
    );

    Ok(Some(result))
}

/// Returns `true` if an SSTable's key bounds `[min_a, max_a]` intersect a
/// tombstone's half-open range `[start, end)`.
fn range_overlaps(min_a: &[u8], max_a: &[u8], start: &[u8], end: &[u8]) -> bool {
    min_a < end && start <= max_a
}

/// Deduplicates a merge iterator stream, keeping the highest LSN per key.
///
/// Tombstones (point and range) are only dropped from the output when they
/// are both past `tombstone_ttl_secs` *and* no `other_sstables` entry (an L1
/// table, or any L0 table outside this merge) could still hold an older
/// version the tombstone needs to keep covering — checked via bloom filter
/// for point deletes and key-range overlap for range deletes. When a range
/// tombstone is dropped this way, any stale point entries it alone covered
/// are removed too, since nothing else in the output will suppress them.
fn dedup_records(
    merge_iter: impl Iterator<Item = Record>,
    tombstone_ttl_secs: u64,
    other_sstables: &[&SSTable],
) -> (Vec<PointEntry>, Vec<RangeTombstone>) {
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let ttl_nanos = tombstone_ttl_secs.saturating_mul(1_000_000_000);
    let expired = |ts: u64| now_nanos.saturating_sub(ts) > ttl_nanos;

    let mut point_entries = Vec::new();
    let mut range_tombstones_all = Vec::new();
    let mut last_key: Option<Vec<u8>> = None;

    for record in merge_iter {
        match record {
            Record::RangeDelete {
                start,
                end,
                lsn,
                timestamp,
            } => {
                range_tombstones_all.push(RangeTombstone {
                    start,
                    end,
                    lsn,
                    timestamp,
                });
            }
            Record::Put {
                key,
                value,
                lsn,
                timestamp,
            } => {
                if last_key.as_ref() == Some(&key) {
                    continue; // Older version — skip
                }
                last_key = Some(key.clone());
                point_entries.push(PointEntry {
                    key,
                    value: Some(value),
                    lsn,
                    timestamp,
                });
            }
            Record::Delete { key, lsn, timestamp } => {
                if last_key.as_ref() == Some(&key) {
                    continue; // Older version — skip
                }
                last_key = Some(key.clone());
                point_entries.push(PointEntry {
                    key,
                    value: None,
                    lsn,
                    timestamp,
                });
            }
        }
    }

    let mut kept_ranges = Vec::new();
    let mut dropped_ranges = Vec::new();
    for rt in range_tombstones_all {
        let covered_elsewhere = other_sstables
            .iter()
            .any(|s| range_overlaps(&s.properties.min_key, &s.properties.max_key, &rt.start, &rt.end));
        if expired(rt.timestamp) && !covered_elsewhere {
            dropped_ranges.push(rt);
        } else {
            kept_ranges.push(rt);
        }
    }

    // A point entry only needed propping up by a dropped range tombstone
    // (lower LSN, inside its range) would resurrect once that tombstone is
    // gone — drop it too.
    point_entries.retain(|pe| {
        !dropped_ranges
            .iter()
            .any(|rt| pe.lsn < rt.lsn && pe.key.as_slice() >= rt.start.as_slice() && pe.key.as_slice() < rt.end.as_slice())
    });

    let out_points = point_entries
        .into_iter()
        .filter(|pe| {
            if pe.value.is_some() || !expired(pe.timestamp) {
                return true;
            }
            // Expired point delete: only safe to drop if no other SSTable
            // might still hold an older version of this key.
            other_sstables.iter().any(|s| s.bloom_may_contain(&pe.key))
        })
        .collect();

    (out_points, kept_ranges)
}

/// Creates scan iterators for the given SSTables covering their full key range.
///
/// Computes the min/max key bounds across all selected SSTables and returns
/// a vec of boxed iterators that can be fed into [`MergeIterator`].
///
/// The returned iterators borrow the SSTables; iteration is **streaming**
/// (block-by-block via mmap) so only one data block per SSTable is
/// resident in memory at a time.
fn full_range_scan_iters<'a>(
    sstables: &'a [&'a SSTable],
) -> Result<Vec<Box<dyn Iterator<Item = Record> + 'a>>, SSTableError> {
    if sstables.is_empty() {
        return Ok(Vec::new());
    }

    let min_key = sstables
        .iter()
        .map(|s| &s.properties.min_key)
        .min()
        .ok_or_else(|| SSTableError::Internal("empty sstables in full_range_scan".into()))?
        .clone();

    let mut max_key = sstables
        .iter()
        .map(|s| &s.properties.max_key)
        .max()
        .ok_or_else(|| SSTableError::Internal("empty sstables in full_range_scan".into()))?
        .clone();
    // Extend max_key past the actual max key to make it exclusive.
    max_key.push(0xFF);

    let mut iters: Vec<Box<dyn Iterator<Item = Record> + 'a>> = Vec::new();
    for sst in sstables {
        let scan = sst.scan(&min_key, &max_key)?;
        iters.push(Box::new(scan));
    }

    Ok(iters)
}

/// Builds the L1 SSTable, durably records the manifest event sequence, and
/// deletes the consumed L0 files.
///
/// If both `point_entries` and `range_tombstones` are empty, no new SSTable
/// is produced — the inputs are simply sealed away and removed.
fn finalize_compaction(
    manifest: &Manifest,
    data_dir: &str,
    inputs: &[&SSTable],
    removed_ids: Vec<u64>,
    point_entries: Vec<PointEntry>,
    range_tombstones: Vec<RangeTombstone>,
) -> Result<CompactionResult, CompactionError> {
    let mut new_sst_paths = Vec::new();
    let mut new_sst_ids = Vec::new();
    let mut out_first_key = Vec::new();
    let mut out_last_key = Vec::new();
    let mut out_total_entries = 0u64;
    let mut out_id = 0u64;

    if point_entries.is_empty() && range_tombstones.is_empty() {
        info!(
            removed_count = removed_ids.len(),
            ?removed_ids,
            "L0 compaction: all entries eliminated"
        );
    } else {
        let new_sst_id = manifest.allocate_sst_id()?;
        let sst_dir = format!("{data_dir}/{SST_L1_DIR}");
        std::fs::create_dir_all(&sst_dir)?;
        let new_sst_path = format!("{sst_dir}/sstable-{new_sst_id}.sst");

        let point_count = point_entries.len();
        let range_count = range_tombstones.len();
        let total_entries = (point_count + range_count) as u64;
        let first_key = point_entries.first().map(|e| e.key.clone()).unwrap_or_default();
        let last_key = point_entries.last().map(|e| e.key.clone()).unwrap_or_default();

        debug!(
            new_sst_id,
            point_count,
            range_count,
            path = %new_sst_path,
            "L0 compaction: building L1 SSTable"
        );

        sstable::SstWriter::new(&new_sst_path).build(
            point_entries.into_iter(),
            point_count,
            range_tombstones.into_iter(),
            range_count,
        )?;

        manifest.append_sst_seal(
            ManifestSstEntry {
                id: new_sst_id,
                level: 1,
                path: new_sst_path.clone().into(),
            },
            total_entries,
            &first_key,
            &last_key,
        )?;

        out_id = new_sst_id;
        out_total_entries = total_entries;
        out_first_key = first_key;
        out_last_key = last_key;
        new_sst_paths.push(new_sst_path);
        new_sst_ids.push(new_sst_id);
    }

    for sst in inputs {
        let path = format!("{data_dir}/sst/L0/sstable-{}.sst", sst.id);
        manifest.append_sst_delete(sst.id, path.clone())?;
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(id = sst.id, %e, "failed to remove old SSTable file during compaction");
        }
    }

    manifest.append_compaction_end(1, out_id, out_total_entries, &out_first_key, &out_last_key)?;

    Ok(CompactionResult {
        removed_ids,
        new_sst_paths,
        new_sst_ids,
    })
}
