//! # AkkaraDB
//!
//! An embedded, single-node, crash-safe ordered key-value storage engine
//! built on a **Log-Structured Merge Tree (LSM-tree)** architecture, with
//! optional striped parity for lane-level redundancy. Designed for
//! predictable tail latency on NVMe devices.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Engine                           │
//! │  ┌────────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │  Active     │  │   Frozen     │  │  SSTables   │  │
//! │  │  Memtable   │  │  Memtables   │  │  (on disk)  │  │
//! │  │  + WAL      │  │  + WALs      │  │             │  │
//! │  └─────┬───────┘  └──────┬───────┘  └──────┬──────┘  │
//! │        │   freeze        │   flush         │         │
//! │        └─────────►       └────────►        │         │
//! │                                            │         │
//! │  ┌──────────────────────────────────────────┘         │
//! │  │  Compactor (L0 → L1 merge)                         │
//! │  └───────────────────────────────────────────────────┘│
//! │                                                      │
//! │  ┌──────────────────────────────────────────────────┐ │
//! │  │              Manifest (WAL + snapshot)           │ │
//! │  └──────────────────────────────────────────────────┘ │
//! │                                                      │
//! │  ┌──────────────────────────────────────────────────┐ │
//! │  │   Stripe writer (k data + m parity lanes)        │ │
//! │  └──────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Core storage engine — open, read, write, scan, flush, compact |
//! | [`memtable`] | In-memory write buffer with multi-version entries and range tombstones |
//! | [`wal`] | Generic, CRC-protected write-ahead log for crash recovery |
//! | [`sstable`] | Immutable, sorted, on-disk tables with bloom filters and block indices |
//! | [`manifest`] | Append-only metadata log (WAL + snapshot model) |
//! | [`compaction`] | L0 → L1 merge compaction |
//! | [`block`] | CRC32C-sealed 32 KiB block codec with fixed record headers |
//! | [`parity`] | Polymorphic parity coder (none / XOR / dual-XOR / Reed-Solomon) |
//! | [`stripe`] | Striped lane writer/reader built on the block codec and parity coder |
//! | [`gf256`] | GF(2^8) arithmetic backing Reed-Solomon |
//!
//! ## Key Features
//!
//! - **Write-ahead logging** — every mutation is persisted to a
//!   group-committed WAL before being acknowledged, guaranteeing
//!   durability and crash recovery.
//! - **Multi-version concurrency** — multiple versions per key, ordered by
//!   sequence number. Reads always see the latest committed version.
//! - **Point and range tombstones** — efficient delete semantics for both
//!   individual keys and key ranges.
//! - **Bloom filter lookups** — each SSTable carries a bloom filter for
//!   fast negative point-lookup responses.
//! - **Block-level CRC32C integrity** — every on-disk block (WAL records,
//!   stripe lanes, SSTable data blocks, headers, footers) is checksummed.
//! - **Striped redundancy** — optional XOR / dual-XOR / Reed-Solomon
//!   parity lanes reconstruct lost or corrupted data lanes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use akkaradb::engine::{Engine, EngineConfig};
//!
//! let config = EngineConfig::default();
//! let engine = Engine::open("/tmp/my_db", config).unwrap();
//!
//! // Write
//! engine.put(b"hello".to_vec(), b"world".to_vec()).unwrap();
//!
//! // Read
//! assert_eq!(engine.get(b"hello".to_vec()).unwrap(), Some(b"world".to_vec()));
//!
//! // Delete
//! engine.delete(b"hello".to_vec()).unwrap();
//! assert_eq!(engine.get(b"hello".to_vec()).unwrap(), None);
//!
//! // Scan
//! engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
//! engine.put(b"b".to_vec(), b"2".to_vec()).unwrap();
//! let results: Vec<_> = engine.scan(b"a", b"c").unwrap().collect();
//!
//! // Graceful shutdown
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod block;
pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod gf256;
pub mod manifest;
pub mod memtable;
pub mod parity;
pub mod sstable;
pub mod stripe;
pub mod wal;
