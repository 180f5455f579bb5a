//! Resource cleanup verification tests.
//!
//! These tests verify that the engine correctly manages files on disk:
//! SSTable files are removed after compaction, temp files are cleaned up,
//! and orphan SSTables are removed on open. WAL files are **not** deleted
//! after flush (they remain on disk; only the manifest's frozen list is
//! updated). These tests check actual on-disk file counts across both the
//! `sst/L0` and `sst/L1` directories.
//!
//! ## See also
//! - [`tests_hardening`] — orphan SSTable cleanup on open
//! - [`tests_crash_flush`] — crash debris: `.tmp` files cleaned

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use crate::engine::tests::helpers::*;
    use crate::engine::{Engine, EngineConfig, SST_L0_DIR, SST_L1_DIR};
    use std::fs;
    use tempfile::TempDir;

    fn compaction_config() -> EngineConfig {
        init_tracing();
        EngineConfig {
            write_buffer_size: 128,
            l0_compaction_threshold: 2,
            ..EngineConfig::default()
        }
    }

    /// Count `.sst` files across both level directories.
    fn count_sst_files(path: &std::path::Path) -> usize {
        [SST_L0_DIR, SST_L1_DIR]
            .iter()
            .map(|dir| count_files_with_ext(&path.join(dir), "sst"))
            .sum()
    }

    /// Count `.tmp` files across both level directories.
    fn count_tmp_files(path: &std::path::Path) -> usize {
        [SST_L0_DIR, SST_L1_DIR]
            .iter()
            .map(|dir| count_files_with_ext(&path.join(dir), "tmp"))
            .sum()
    }

    fn count_files_with_ext(dir: &std::path::Path, ext: &str) -> usize {
        if !dir.exists() {
            return 0;
        }
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                let name = e
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .to_string();
                name.ends_with(&format!(".{ext}"))
            })
            .count()
    }

    // ================================================================
    // 1. SSTable created after flush
    // ================================================================

    /// # Scenario
    /// After flushing frozen memtables, SSTable files must appear on disk.
    ///
    /// # Expected behavior
    /// At least one `.sst` file exists after `flush_all_frozen()`.
    #[test]
    fn memtable_sstable__sst_files_created_after_flush() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path();

        let engine = Engine::open(path, small_buffer_config()).unwrap();

        for i in 0..40u32 {
            engine
                .put(
                    format!("key_{i:04}").into_bytes(),
                    format!("value_padding_{i:04}").into_bytes(),
                )
                .unwrap();
        }

        let sst_before = count_sst_files(path);
        engine.flush_all_frozen().unwrap();
        let sst_after = count_sst_files(path);

        assert!(
            sst_after > sst_before,
            "SSTable count should increase after flush: before={sst_before}, after={sst_after}"
        );
    }

    // ================================================================
    // 2. L0 file count drops to a single L1 file after compaction
    // ================================================================

    /// # Scenario
    /// After L0 compaction, the consumed L0 SSTables are deleted and
    /// replaced by a single merged SSTable in L1.
    ///
    /// # Expected behavior
    /// After compaction: zero files in `sst/L0`, one file in `sst/L1`.
    #[test]
    fn memtable_sstable__sst_file_count_decreases_after_compaction() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path();

        let engine = Engine::open(path, compaction_config()).unwrap();
        for i in 0..200u32 {
            engine
                .put(
                    format!("key_{i:04}").into_bytes(),
                    format!("value_with_some_padding_{i:04}").into_bytes(),
                )
                .unwrap();
        }
        engine.flush_all_frozen().unwrap();

        let l0_before = count_files_with_ext(&path.join(SST_L0_DIR), "sst");
        assert!(
            l0_before >= 2,
            "Expected >= 2 L0 SSTables before compaction, got {l0_before}"
        );

        assert!(engine.compact().unwrap(), "Compaction should run");

        let l0_after = count_files_with_ext(&path.join(SST_L0_DIR), "sst");
        let l1_after = count_files_with_ext(&path.join(SST_L1_DIR), "sst");
        assert_eq!(l0_after, 0, "Expected 0 L0 SSTables after compaction");
        assert_eq!(l1_after, 1, "Expected 1 L1 SSTable after compaction");
    }

    // ================================================================
    // 3. No .tmp files after successful flush
    // ================================================================

    /// # Scenario
    /// After a successful flush, no `.tmp` files should remain in the
    /// sstables directories. The SstWriter uses `.tmp` during build and
    /// atomically renames to `.sst`.
    ///
    /// # Expected behavior
    /// Zero `.tmp` files.
    #[test]
    fn memtable_sstable__no_tmp_files_after_flush() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path();

        let engine = Engine::open(path, small_buffer_config()).unwrap();
        for i in 0..30u32 {
            engine
                .put(
                    format!("key_{i:04}").into_bytes(),
                    format!("val_{i:04}").into_bytes(),
                )
                .unwrap();
        }
        engine.flush_all_frozen().unwrap();

        let tmp_count = count_tmp_files(path);
        assert_eq!(tmp_count, 0, "No .tmp files should remain after flush");
    }

    // ================================================================
    // 4. No .tmp files after successful compaction
    // ================================================================

    /// # Scenario
    /// After a successful compaction, no `.tmp` files should remain.
    ///
    /// # Expected behavior
    /// Zero `.tmp` files.
    #[test]
    fn memtable_sstable__no_tmp_files_after_compaction() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path();

        let engine = Engine::open(path, compaction_config()).unwrap();
        for i in 0..200u32 {
            engine
                .put(
                    format!("key_{i:04}").into_bytes(),
                    format!("value_with_some_padding_{i:04}").into_bytes(),
                )
                .unwrap();
        }
        engine.flush_all_frozen().unwrap();
        engine.compact().unwrap();

        let tmp_count = count_tmp_files(path);
        assert_eq!(tmp_count, 0, "No .tmp files should remain after compaction");
    }

    // ================================================================
    // 5. Orphan SSTables removed on reopen
    // ================================================================

    /// # Scenario
    /// Place a stray `.sst` file in the L0 directory that is not tracked
    /// by the manifest. On reopen, the engine should remove it.
    ///
    /// # Expected behavior
    /// After reopening, the orphan SSTable file is removed.
    #[test]
    fn memtable_sstable__orphan_sst_removed_on_reopen() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path();

        // Create an engine and write + flush to get true SSTables.
        let engine = engine_with_sstables(path, 50, "key");
        let sst_count = count_sst_files(path);
        engine.close().unwrap();

        // Plant an orphan SSTable that the manifest does not know about.
        let sst_dir = path.join(SST_L0_DIR);
        let orphan_path = sst_dir.join("sstable-999999.sst");
        fs::write(&orphan_path, b"fake sst data").unwrap();
        assert_eq!(
            count_sst_files(path),
            sst_count + 1,
            "Orphan should be on disk"
        );

        // Reopen the engine — orphan should be cleaned up.
        let engine2 = Engine::open(path, default_config()).unwrap();
        let sst_after = count_sst_files(path);
        assert_eq!(
            sst_after, sst_count,
            "Orphan SSTable should be removed on reopen"
        );

        // Data should still be intact.
        assert!(engine2.get(b"key_0000".to_vec()).unwrap().is_some());
    }

    // ================================================================
    // 6. Multiple flush/compaction cycles — bounded SSTable count
    // ================================================================

    /// # Scenario
    /// Run multiple write -> flush -> compaction cycles and verify that
    /// the SSTable count stays bounded and no temp files leak.
    ///
    /// # Expected behavior
    /// SSTable count stays bounded across cycles. No `.tmp` files on disk.
    #[test]
    fn memtable_sstable__multiple_cycles_no_file_leak() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path();

        let engine = Engine::open(path, compaction_config()).unwrap();

        for cycle in 0..3u32 {
            for i in 0..30u32 {
                engine
                    .put(
                        format!("c{cycle}_k{i:02}").into_bytes(),
                        format!("c{cycle}_v{i:02}").into_bytes(),
                    )
                    .unwrap();
            }
            engine.flush_all_frozen().unwrap();
            engine.compact().unwrap();
        }

        let sst_count = count_sst_files(path);
        let tmp_count = count_tmp_files(path);

        assert!(
            sst_count <= 6,
            "SSTable count should be bounded, got {sst_count}"
        );
        assert_eq!(tmp_count, 0, "No temp files should remain");
    }
}
