//! # Frame Pool / Pager Tests
//!
//! Verifies the pager invariants: frame conservation, mutual exclusion of
//! frame ownership, residency bijection, monotone counters, and FIFO
//! victim selection by admission order (never by last access).

use std::collections::HashSet;
use std::sync::Arc;

use csopesy_core::common::Pid;
use csopesy_core::mem::layout::ProcessMemoryLayout;
use csopesy_core::mem::pager::FramePool;
use csopesy_core::SimError;

use crate::common::mocks::{MemoryStore, MockStore};

const FRAME_SIZE: usize = 16;

fn pool_with(frames: usize) -> Arc<FramePool> {
    let store = Arc::new(MemoryStore::new(FRAME_SIZE));
    Arc::new(FramePool::new(frames, FRAME_SIZE, store).unwrap())
}

fn register(pool: &FramePool, pid: Pid, memory_size: usize) -> Arc<ProcessMemoryLayout> {
    let layout = Arc::new(ProcessMemoryLayout::new(memory_size, FRAME_SIZE));
    pool.register(pid, Arc::clone(&layout));
    layout
}

/// Checks conservation, mutual exclusion, and the residency bijection over
/// every registered layout.
fn assert_invariants(pool: &FramePool, layouts: &[(Pid, &ProcessMemoryLayout)]) {
    let frames = pool.frame_table();
    let stats = pool.statistics();

    assert_eq!(
        stats.frames_used,
        frames.iter().filter(|f| f.occupied).count(),
        "frames_used must equal the occupied frame count"
    );

    let mut seen = HashSet::new();
    let mut resident = 0;
    for (pid, layout) in layouts {
        for (page, entry) in layout.page_table_snapshot().iter().enumerate() {
            assert_eq!(entry.loaded, entry.frame.is_some());
            if let Some(index) = entry.frame {
                assert!(seen.insert(index), "frame {} referenced twice", index);
                let frame = &frames[index];
                assert!(frame.occupied);
                assert_eq!(frame.pid, Some(*pid));
                assert_eq!(frame.page, page);
                resident += 1;
            }
        }
    }
    assert_eq!(stats.frames_used, resident);
}

#[test]
fn first_access_faults_then_hits() {
    let pool = pool_with(4);
    register(&pool, 1, 64);

    pool.access(1, 0x00, false).unwrap();
    assert_eq!(pool.statistics().faults, 1);

    pool.access(1, 0x04, false).unwrap();
    assert_eq!(pool.statistics().faults, 1, "same page must not re-fault");
}

#[test]
fn free_list_is_used_before_eviction() {
    let pool = pool_with(2);
    register(&pool, 1, 64);

    pool.access(1, 0x00, false).unwrap();
    pool.access(1, 0x10, false).unwrap();

    let stats = pool.statistics();
    assert_eq!(stats.faults, 2);
    assert_eq!(stats.replacements, 0);
    assert_eq!(stats.frames_used, 2);
}

#[test]
fn fifo_evicts_by_admission_order() {
    let pool = pool_with(2);
    let layout = register(&pool, 1, 64);

    pool.access(1, 0x00, false).unwrap(); // page 0 → first admitted
    pool.access(1, 0x10, false).unwrap(); // page 1
    let frame_of_page0 = layout.page_table_snapshot()[0].frame.unwrap();
    let frame_of_page1 = layout.page_table_snapshot()[1].frame.unwrap();
    assert_eq!(pool.fifo_order(), vec![frame_of_page0, frame_of_page1]);

    pool.access(1, 0x20, false).unwrap(); // page 2 evicts page 0
    assert_eq!(
        pool.fifo_order(),
        vec![frame_of_page1, frame_of_page0],
        "the re-admitted frame moves to the FIFO tail"
    );

    let entries = layout.page_table_snapshot();
    assert!(!entries[0].loaded);
    assert_eq!(entries[0].frame, None);
    assert_eq!(entries[2].frame, Some(frame_of_page0));
    assert_eq!(pool.statistics().replacements, 1);
    assert_invariants(&pool, &[(1, &*layout)]);
}

#[test]
fn victim_selection_ignores_last_accessed() {
    let pool = pool_with(2);
    let layout = register(&pool, 1, 64);

    pool.access(1, 0x00, false).unwrap();
    pool.access(1, 0x10, false).unwrap();
    // Page 0 is now the most recently accessed, but it was admitted first.
    pool.access(1, 0x00, false).unwrap();
    pool.access(1, 0x00, false).unwrap();

    pool.access(1, 0x20, false).unwrap();

    let entries = layout.page_table_snapshot();
    assert!(
        !entries[0].loaded,
        "FIFO must evict the first-admitted page even when recently used"
    );
    assert!(entries[1].loaded);
    assert!(entries[2].loaded);
}

#[test]
fn eviction_preserves_entry_dirty_bit() {
    let pool = pool_with(2);
    let layout = register(&pool, 1, 64);

    pool.access(1, 0x00, true).unwrap(); // dirty page 0
    pool.access(1, 0x10, false).unwrap();
    pool.access(1, 0x20, false).unwrap(); // evicts page 0

    let entries = layout.page_table_snapshot();
    assert!(!entries[0].loaded);
    assert!(entries[0].dirty, "eviction must preserve the dirty bit");

    // Clean eviction leaves the bit clear.
    pool.access(1, 0x30, false).unwrap(); // evicts page 1 (clean)
    let entries = layout.page_table_snapshot();
    assert!(!entries[1].loaded);
    assert!(!entries[1].dirty);
}

#[test]
fn reload_clears_entry_dirty_bit() {
    let pool = pool_with(2);
    let layout = register(&pool, 1, 64);

    pool.access(1, 0x00, true).unwrap();
    pool.access(1, 0x10, false).unwrap();
    pool.access(1, 0x20, false).unwrap(); // evicts dirty page 0
    pool.access(1, 0x00, false).unwrap(); // reloads page 0

    let entries = layout.page_table_snapshot();
    assert!(entries[0].loaded);
    assert!(!entries[0].dirty);
}

#[test]
fn dirty_eviction_writes_back_once() {
    let mut mock = MockStore::new();
    mock.expect_store()
        .withf(|pid, page, _| *pid == 1 && *page == 0)
        .times(1)
        .returning(|_, _, _| Ok(()));
    mock.expect_load().returning(|_, _| Ok(vec![0; 8]));

    let pool = FramePool::new(2, FRAME_SIZE, Arc::new(mock)).unwrap();
    register(&pool, 1, 64);

    pool.access(1, 0x00, true).unwrap();
    pool.access(1, 0x10, false).unwrap();
    pool.access(1, 0x20, false).unwrap(); // evicts dirty page 0
}

#[test]
fn clean_eviction_skips_write_back() {
    let mut mock = MockStore::new();
    mock.expect_store().times(0);
    mock.expect_load().times(3).returning(|_, _| Ok(vec![0; 8]));

    let pool = FramePool::new(2, FRAME_SIZE, Arc::new(mock)).unwrap();
    register(&pool, 1, 64);

    pool.access(1, 0x00, false).unwrap();
    pool.access(1, 0x10, false).unwrap();
    pool.access(1, 0x20, false).unwrap();
}

#[test]
fn free_returns_frames_without_write_back() {
    let mut mock = MockStore::new();
    mock.expect_store().times(0);
    mock.expect_load().returning(|_, _| Ok(vec![0; 8]));

    let pool = FramePool::new(4, FRAME_SIZE, Arc::new(mock)).unwrap();
    let layout = register(&pool, 1, 64);

    pool.access(1, 0x00, true).unwrap();
    pool.access(1, 0x10, true).unwrap();
    assert_eq!(pool.statistics().frames_used, 2);

    pool.free_process_pages(1);
    assert_eq!(pool.statistics().frames_used, 0);
    assert!(layout.page_table_snapshot().iter().all(|e| !e.loaded));
}

#[test]
fn free_is_idempotent() {
    let pool = pool_with(4);
    let layout = register(&pool, 1, 64);

    pool.access(1, 0x00, false).unwrap();
    pool.access(1, 0x10, false).unwrap();

    pool.free_process_pages(1);
    let after_first = pool.statistics();
    pool.free_process_pages(1);
    let after_second = pool.statistics();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.frames_used, 0);
    assert_invariants(&pool, &[(1, &*layout)]);
}

#[test]
fn free_leaves_other_processes_resident() {
    let pool = pool_with(4);
    let layout_a = register(&pool, 1, 64);
    let layout_b = register(&pool, 2, 64);

    pool.access(1, 0x00, false).unwrap();
    pool.access(2, 0x00, false).unwrap();
    pool.access(2, 0x10, false).unwrap();

    pool.free_process_pages(1);

    assert_eq!(pool.statistics().frames_used, 2);
    assert!(!layout_a.page_table_snapshot()[0].loaded);
    assert!(layout_b.page_table_snapshot()[0].loaded);
    assert_invariants(&pool, &[(1, &*layout_a), (2, &*layout_b)]);
}

#[test]
fn out_of_bounds_access_is_rejected() {
    let pool = pool_with(4);
    register(&pool, 1, 64);

    let err = pool.access(1, 64, false).unwrap_err();
    assert_eq!(err, SimError::InvalidAddress { pid: 1, addr: 64 });

    let err = pool.access(1, 0x1000, false).unwrap_err();
    assert_eq!(
        err,
        SimError::InvalidAddress {
            pid: 1,
            addr: 0x1000
        }
    );

    // Rejected accesses fault nothing in.
    assert_eq!(pool.statistics().faults, 0);
}

#[test]
fn unregistered_pid_is_rejected() {
    let pool = pool_with(4);
    assert!(pool.access(9, 0x00, false).is_err());
}

#[test]
fn counters_are_monotone_under_traffic() {
    let pool = pool_with(2);
    register(&pool, 1, 128);

    let mut last_faults = 0;
    let mut last_replacements = 0;
    for round in 0..3 {
        for page in 0..8 {
            pool.access(1, (page * FRAME_SIZE) as u32, round % 2 == 0)
                .unwrap();
            let stats = pool.statistics();
            assert!(stats.faults >= last_faults);
            assert!(stats.replacements >= last_replacements);
            last_faults = stats.faults;
            last_replacements = stats.replacements;
        }
    }
}

#[test]
fn disjoint_pids_reach_the_same_final_state() {
    // The same serialized access sequence must produce the same frame
    // table regardless of which pool instance runs it.
    let run = |ops: &[(Pid, u32, bool)]| {
        let pool = pool_with(4);
        register(&pool, 1, 64);
        register(&pool, 2, 64);
        for (pid, addr, write) in ops {
            pool.access(*pid, *addr, *write).unwrap();
        }
        pool.frame_table()
            .into_iter()
            .map(|f| (f.pid, f.page, f.occupied, f.dirty))
            .collect::<Vec<_>>()
    };

    let ops = [
        (1, 0x00, true),
        (2, 0x00, false),
        (1, 0x10, false),
        (2, 0x10, true),
        (1, 0x20, false),
        (2, 0x20, false),
    ];
    assert_eq!(run(&ops), run(&ops));
}

#[test]
fn invariants_hold_under_multi_process_pressure() {
    let pool = pool_with(3);
    let layout_a = register(&pool, 1, 128);
    let layout_b = register(&pool, 2, 128);

    for page in 0..8 {
        pool.access(1, (page * FRAME_SIZE) as u32, page % 2 == 0).unwrap();
        pool.access(2, ((7 - page) * FRAME_SIZE) as u32, page % 3 == 0)
            .unwrap();
        assert_invariants(&pool, &[(1, &*layout_a), (2, &*layout_b)]);
    }

    let stats = pool.statistics();
    assert_eq!(stats.frames_used, 3);
    assert!(stats.faults >= 16 - 3);
}

#[test]
fn zero_frames_is_a_construction_error() {
    let store = Arc::new(MemoryStore::new(FRAME_SIZE));
    assert!(FramePool::new(0, FRAME_SIZE, store.clone()).is_err());
    assert!(FramePool::new(4, 0, store).is_err());
}
