//! Striped I/O group: `k` data lanes plus `m` parity lanes, written and
//! read together as fixed-size stripes of [`crate::block::BLOCK_SIZE`]
//! blocks.
//!
//! Blocks destined for the same stripe index are buffered until `k` of
//! them have accumulated, parity-encoded via a [`ParityScheme`], and
//! appended to their respective lane files. Durability follows the
//! teacher's group-commit shape: lanes are fsynced together every
//! `GROUP_COMMIT_BLOCKS` stripes, or after `GROUP_COMMIT_MICROS` have
//! elapsed since the oldest uncommitted stripe, whichever comes first.


use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::block::BLOCK_SIZE;
use crate::manifest::{Manifest, ManifestError};
use crate::parity::{ParityError, ParityScheme};

/// Default number of stripes batched into a single fsync.
pub const GROUP_COMMIT_STRIPES: usize = 32;

/// Default maximum delay before a partially-filled commit batch is
/// forced to disk, in microseconds.
pub const GROUP_COMMIT_MICROS: u64 = 500;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("stripe I/O error on lane {lane}: {source}")]
    Io {
        lane: usize,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parity(#[from] ParityError),

    #[error("lane {lane} is short {short} bytes of a full block at stripe {stripe}")]
    ShortLane { lane: usize, stripe: u64, short: usize },

    #[error("too many lanes unreadable to reconstruct stripe {stripe}: lost {lost}, budget {budget}")]
    Unreconstructable { stripe: u64, lost: usize, budget: usize },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Lifecycle of one in-flight stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripeState {
    Accumulating,
    ParityEncoded,
    LanesWritten,
    Committed,
}

/// A writer that fans sealed blocks out across `k` data lanes and `m`
/// parity lanes, one stripe at a time.
pub struct StripeWriter {
    k: usize,
    scheme: ParityScheme,
    data_lanes: Vec<File>,
    parity_lanes: Vec<File>,
    pending: Vec<Vec<u8>>,
    next_stripe_index: u64,
    state: StripeState,
    uncommitted_stripes: usize,
    batch_opened_at: Option<Instant>,
    fast_mode: bool,
    manifest: Arc<Manifest>,
}

impl StripeWriter {
    /// Open (creating if absent) `k` data lane files and as many parity
    /// lane files as `scheme` requires, under `dir/lanes/`.
    ///
    /// `manifest` receives a `StripeCommit{after, ts}` event every time a
    /// batch of stripes is durably fsynced (see [`StripeWriter::force_sync`]),
    /// which is what lets recovery know how far the lane files can be
    /// trusted without replaying parity checks on every stripe.
    pub fn open(
        dir: &Path,
        k: usize,
        scheme: ParityScheme,
        fast_mode: bool,
        manifest: Arc<Manifest>,
    ) -> Result<Self, StripeError> {
        let lanes_dir = dir.join("lanes");
        std::fs::create_dir_all(&lanes_dir).map_err(|e| StripeError::Io { lane: 0, source: e })?;

        let mut data_lanes = Vec::with_capacity(k);
        for i in 0..k {
            data_lanes.push(open_lane(&lanes_dir.join(format!("data_{i}")))?);
        }
        let m = scheme.parity_count();
        let mut parity_lanes = Vec::with_capacity(m);
        for j in 0..m {
            parity_lanes.push(open_lane(&lanes_dir.join(format!("parity_{j}")))?);
        }

        let next_stripe_index = lane_stripe_count(&data_lanes[0])?;

        Ok(Self {
            k,
            scheme,
            data_lanes,
            parity_lanes,
            pending: Vec::with_capacity(k),
            next_stripe_index,
            state: StripeState::Accumulating,
            uncommitted_stripes: 0,
            batch_opened_at: None,
            fast_mode,
            manifest,
        })
    }

    /// Buffer one sealed block. Returns `Some(stripe_index)` if this
    /// completed a stripe and it was written to the lanes (subject to
    /// group-commit fsync policy — see [`StripeWriter::maybe_sync`]).
    pub fn push_block(&mut self, block: Vec<u8>) -> Result<Option<u64>, StripeError> {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        self.pending.push(block);
        if self.batch_opened_at.is_none() {
            self.batch_opened_at = Some(Instant::now());
        }
        if self.pending.len() < self.k {
            return Ok(None);
        }
        self.flush_stripe()
    }

    fn flush_stripe(&mut self) -> Result<Option<u64>, StripeError> {
        let data: Vec<Vec<u8>> = std::mem::replace(&mut self.pending, Vec::with_capacity(self.k));
        self.state = StripeState::Accumulating;

        let parity = self.scheme.encode(&data)?;
        self.state = StripeState::ParityEncoded;

        for (lane, block) in self.data_lanes.iter_mut().zip(data.iter()) {
            lane.write_all(block)
                .map_err(|e| StripeError::Io { lane: 0, source: e })?;
        }
        for (lane, block) in self.parity_lanes.iter_mut().zip(parity.iter()) {
            lane.write_all(block)
                .map_err(|e| StripeError::Io { lane: 0, source: e })?;
        }
        self.state = StripeState::LanesWritten;

        let stripe_index = self.next_stripe_index;
        self.next_stripe_index += 1;
        self.uncommitted_stripes += 1;

        self.maybe_sync()?;

        Ok(Some(stripe_index))
    }

    /// Apply the group-commit policy: fsync all lanes once
    /// `GROUP_COMMIT_STRIPES` have accumulated or
    /// `GROUP_COMMIT_MICROS` have elapsed since the batch opened.
    ///
    /// `fast_mode` affects only this cadence; it never touches WAL
    /// durability, which is governed independently by `wal::Wal`.
    fn maybe_sync(&mut self) -> Result<(), StripeError> {
        let elapsed = self
            .batch_opened_at
            .map(|t| t.elapsed() >= Duration::from_micros(GROUP_COMMIT_MICROS))
            .unwrap_or(false);
        let due = self.uncommitted_stripes >= GROUP_COMMIT_STRIPES || elapsed;
        if !due && !self.fast_mode {
            return Ok(());
        }
        if self.fast_mode && self.uncommitted_stripes < GROUP_COMMIT_STRIPES && !elapsed {
            // fastMode relaxes (does not eliminate) the commit cadence:
            // still batches, just never forces a sync mid-batch here.
            return Ok(());
        }
        self.force_sync()
    }

    /// Force an fsync of every lane file, marking all buffered stripes
    /// committed, then append a durable `StripeCommit{after, ts}` manifest
    /// event before returning. Call at shutdown to guarantee durability of
    /// the tail.
    ///
    /// A caller must not treat any stripe as acknowledged until this
    /// returns `Ok`: the manifest event is the durability boundary, not
    /// the lane fsyncs alone.
    pub fn force_sync(&mut self) -> Result<(), StripeError> {
        if self.uncommitted_stripes == 0 {
            return Ok(());
        }
        for lane in &self.data_lanes {
            lane.sync_data().map_err(|e| StripeError::Io { lane: 0, source: e })?;
        }
        for lane in &self.parity_lanes {
            lane.sync_data().map_err(|e| StripeError::Io { lane: 0, source: e })?;
        }
        self.state = StripeState::Committed;
        self.uncommitted_stripes = 0;
        self.batch_opened_at = None;
        self.manifest.append_stripe_commit(self.next_stripe_index)?;
        debug!(stripe = self.next_stripe_index, "stripe group committed");
        Ok(())
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn scheme(&self) -> ParityScheme {
        self.scheme
    }

    pub fn stripes_written(&self) -> u64 {
        self.next_stripe_index
    }
}

fn open_lane(path: &Path) -> Result<File, StripeError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StripeError::Io { lane: 0, source: e })
}

fn lane_stripe_count(lane: &File) -> Result<u64, StripeError> {
    let len = lane
        .metadata()
        .map_err(|e| StripeError::Io { lane: 0, source: e })?
        .len();
    Ok(len / BLOCK_SIZE as u64)
}

/// Reads blocks back from a stripe group, reconstructing from parity
/// when a lane is missing or short.
pub struct StripeReader {
    k: usize,
    scheme: ParityScheme,
    data_lane_paths: Vec<PathBuf>,
    parity_lane_paths: Vec<PathBuf>,
}

impl StripeReader {
    pub fn open(dir: &Path, k: usize, scheme: ParityScheme) -> Result<Self, StripeError> {
        let lanes_dir = dir.join("lanes");
        let data_lane_paths = (0..k).map(|i| lanes_dir.join(format!("data_{i}"))).collect();
        let parity_lane_paths = (0..scheme.parity_count())
            .map(|j| lanes_dir.join(format!("parity_{j}")))
            .collect();
        Ok(Self {
            k,
            scheme,
            data_lane_paths,
            parity_lane_paths,
        })
    }

    /// Read the `k` data blocks of stripe `index`, reconstructing any
    /// lane that is missing, short, or fails CRC from parity.
    pub fn read_stripe(&self, index: u64) -> Result<Vec<Vec<u8>>, StripeError> {
        let mut present_data: Vec<Option<Vec<u8>>> = Vec::with_capacity(self.k);
        let mut lost: Vec<usize> = Vec::new();
        for (i, path) in self.data_lane_paths.iter().enumerate() {
            match read_block_at(path, index) {
                Ok(block) => present_data.push(Some(block)),
                Err(_) => {
                    present_data.push(None);
                    lost.push(i);
                }
            }
        }

        if lost.is_empty() {
            return Ok(present_data.into_iter().map(Option::unwrap).collect());
        }

        let m = self.scheme.parity_count();
        if lost.len() > m {
            return Err(StripeError::Unreconstructable {
                stripe: index,
                lost: lost.len(),
                budget: m,
            });
        }

        warn!(stripe = index, lost = lost.len(), "reconstructing stripe from parity");

        let mut present_parity: Vec<Option<Vec<u8>>> = Vec::with_capacity(m);
        for path in &self.parity_lane_paths {
            present_parity.push(read_block_at(path, index).ok());
        }

        let recovered = self.scheme.decode(self.k, &lost, &present_data, &present_parity)?;
        for (idx, block) in recovered {
            if idx < self.k {
                present_data[idx] = Some(block);
            }
        }

        Ok(present_data
            .into_iter()
            .enumerate()
            .map(|(i, b)| b.unwrap_or_else(|| panic!("stripe {index} lane {i} unreconstructed")))
            .collect())
    }

    /// Truncate every lane to `stripes_written` complete blocks,
    /// discarding any partial tail left by an interrupted write.
    /// Called once at startup per the recovery sequence.
    pub fn truncate_tails(&self, stripes_written: u64) -> Result<(), StripeError> {
        let target_len = stripes_written * BLOCK_SIZE as u64;
        for path in self.data_lane_paths.iter().chain(self.parity_lane_paths.iter()) {
            if !path.exists() {
                continue;
            }
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| StripeError::Io { lane: 0, source: e })?;
            let len = file
                .metadata()
                .map_err(|e| StripeError::Io { lane: 0, source: e })?
                .len();
            if len > target_len {
                info!(path = %path.display(), from = len, to = target_len, "truncating stripe lane tail");
                file.set_len(target_len)
                    .map_err(|e| StripeError::Io { lane: 0, source: e })?;
            }
        }
        Ok(())
    }
}

fn read_block_at(path: &Path, index: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(index * BLOCK_SIZE as u64))?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
