//! Public API hardening tests — Priority 3.
//!
//! `EngineConfig` is a plain struct with no field validation (any
//! combination of values is accepted by `Engine::open`), so this suite
//! focuses on edge-case behavior of the operations themselves rather than
//! config boundary rejection.
//!
//! ## See also
//! - [`integration`] — basic CRUD, scan, compaction, concurrency

use akkaradb::engine::{Engine, EngineConfig};
use tempfile::TempDir;

// ================================================================================================
// scan with start == end returns empty
// ================================================================================================

/// # Scenario
/// `scan` with `start == end` returns an empty result (not an error).
#[test]
fn scan_start_equals_end_returns_empty() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    engine.put(b"x".to_vec(), b"v".to_vec()).unwrap();

    let results: Vec<_> = engine.scan(b"x", b"x").unwrap().collect();
    assert!(results.is_empty());

    engine.close().unwrap();
}

// ================================================================================================
// delete_range with empty keys
// ================================================================================================

/// # Scenario
/// `delete_range` with an empty start or end key is rejected by the
/// memtable layer.
#[test]
fn delete_range_empty_keys_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    assert!(engine.delete_range(b"".to_vec(), b"z".to_vec()).is_err());
    assert!(engine.delete_range(b"a".to_vec(), b"".to_vec()).is_err());

    engine.close().unwrap();
}

// ================================================================================================
// compact() on empty db
// ================================================================================================

/// # Scenario
/// `compact()` on a database with no SSTables returns `false`.
#[test]
fn compact_empty_db_returns_false() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    let compacted = engine.compact().unwrap();
    assert!(!compacted);

    engine.close().unwrap();
}

// ================================================================================================
// reopen after only deletes (no live data)
// ================================================================================================

/// # Scenario
/// Write some keys, delete them all, close, reopen. All gets should
/// return `None` and a full scan should be empty.
#[test]
fn reopen_after_delete_all_keys() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        engine.delete(b"a".to_vec()).unwrap();
        engine.delete(b"b".to_vec()).unwrap();
        engine.close().unwrap();
    }
    {
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(engine.get(b"a".to_vec()).unwrap(), None);
        assert_eq!(engine.get(b"b".to_vec()).unwrap(), None);
        let scan: Vec<_> = engine.scan(b"\x00", b"\xff").unwrap().collect();
        assert!(scan.is_empty());
        engine.close().unwrap();
    }
}

// ================================================================================================
// EngineConfig boundary values — accepted regardless of magnitude
// ================================================================================================

/// # Scenario
/// `EngineConfig` performs no field validation — every numeric field is
/// a plain tuning knob. Extreme but structurally valid values (a 1-table
/// L0 threshold, a zero tombstone TTL) must still produce a working
/// engine.
#[test]
fn extreme_config_values_still_open_and_work() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        write_buffer_size: 1024,
        write_buffer_entries: 4,
        l0_compaction_threshold: 1,
        tombstone_ttl_secs: 0,
        bloom_false_positive_rate: 0.5,
        fast_mode: false,
    };
    let engine = Engine::open(dir.path(), config).unwrap();

    engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();
    assert_eq!(engine.get(b"k".to_vec()).unwrap(), Some(b"v".to_vec()));

    engine.close().unwrap();
}
