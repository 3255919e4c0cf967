//! Frame pool and demand pager.
//!
//! The pool owns the fixed set of physical frames, the free list, and the
//! FIFO victim queue. It exposes the four pager operations:
//! 1. **access:** The only path through which programs read or write memory.
//! 2. **page_fault:** Frame selection, eviction, and page load.
//! 3. **free_process_pages:** Lifecycle release of one process's frames.
//! 4. **statistics:** Fault, replacement, and occupancy counters.
//!
//! Replacement is FIFO by admission order; the per-frame `last_accessed`
//! timestamp is recorded for diagnostics only. All pool mutations happen
//! under one pager lock. Page tables are leaf locks taken under it, and
//! backing-store I/O runs only after the pager lock is released; the frame
//! is already reserved by then.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use log::{debug, error};

use crate::common::error::{SimError, SimResult};
use crate::common::Pid;
use crate::mem::backing::PageStore;
use crate::mem::layout::ProcessMemoryLayout;

/// One physical frame's bookkeeping.
///
/// At most one (pid, page) occupies a frame at a time; the occupied frames
/// are exactly the loaded pages across all sessions.
#[derive(Debug, Clone)]
pub struct PhysicalFrame {
    /// Index of this frame in the pool.
    pub index: usize,
    /// Occupying process, if any.
    pub pid: Option<Pid>,
    /// Page number within the occupying process.
    pub page: usize,
    /// Occupancy flag.
    pub occupied: bool,
    /// Set when the resident page has been written.
    pub dirty: bool,
    /// Diagnostic only; never consulted for victim selection.
    pub last_accessed: SystemTime,
}

impl PhysicalFrame {
    fn new(index: usize) -> Self {
        Self {
            index,
            pid: None,
            page: 0,
            occupied: false,
            dirty: false,
            last_accessed: SystemTime::now(),
        }
    }

    fn clear(&mut self) {
        self.pid = None;
        self.page = 0;
        self.occupied = false;
        self.dirty = false;
    }
}

/// Snapshot of one frame for reports.
pub type FrameView = PhysicalFrame;

/// Pager statistics; fault and replacement counts are monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingStats {
    /// Page faults handled.
    pub faults: u64,
    /// Evictions performed.
    pub replacements: u64,
    /// Currently occupied frames: `num_frames - |free list|`.
    pub frames_used: usize,
}

struct PoolState {
    frames: Vec<PhysicalFrame>,
    free: VecDeque<usize>,
    fifo: VecDeque<usize>,
    layouts: HashMap<Pid, Arc<ProcessMemoryLayout>>,
    faults: u64,
    replacements: u64,
}

/// Pending backing-store work collected inside the critical section and
/// executed after the pager lock is dropped.
struct PendingIo {
    writeback: Option<(Pid, usize, Vec<u16>)>,
    load: (Pid, usize),
}

/// Fixed pool of physical frames with FIFO replacement.
pub struct FramePool {
    frame_size: usize,
    num_frames: usize,
    state: Mutex<PoolState>,
    store: Arc<dyn PageStore>,
    poisoned: AtomicBool,
}

impl FramePool {
    /// Builds the pool; every frame starts on the free list.
    ///
    /// A zero frame count or frame size cannot form a pool and is rejected
    /// as a configuration error.
    pub fn new(
        num_frames: usize,
        frame_size: usize,
        store: Arc<dyn PageStore>,
    ) -> SimResult<Self> {
        if num_frames == 0 || frame_size == 0 {
            return Err(SimError::ConfigIo(format!(
                "frame pool requires positive num-frames and mem-per-frame, got {} x {}",
                num_frames, frame_size
            )));
        }

        let frames = (0..num_frames).map(PhysicalFrame::new).collect();
        Ok(Self {
            frame_size,
            num_frames,
            state: Mutex::new(PoolState {
                frames,
                free: (0..num_frames).collect(),
                fifo: VecDeque::new(),
                layouts: HashMap::new(),
                faults: 0,
                replacements: 0,
            }),
            store,
            poisoned: AtomicBool::new(false),
        })
    }

    /// Frame (and page) size in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total frame count.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Registers a process's layout handle so eviction and release never
    /// need the process-table lock.
    pub fn register(&self, pid: Pid, layout: Arc<ProcessMemoryLayout>) {
        let mut state = self.state.lock().unwrap();
        state.layouts.insert(pid, layout);
    }

    /// Drops a process's layout handle.
    pub fn unregister(&self, pid: Pid) {
        let mut state = self.state.lock().unwrap();
        state.layouts.remove(&pid);
    }

    /// True when the pid has a registered layout and can be dispatched.
    pub fn is_admitted(&self, pid: Pid) -> bool {
        self.state.lock().unwrap().layouts.contains_key(&pid)
    }

    /// True after a backing-store failure; the simulator refuses new
    /// submissions while running sessions continue.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Performs one memory access for `pid` at `addr`.
    ///
    /// Faults the page in if it is not resident, then stamps the frame's
    /// last-accessed time, the entry's accessed bit, and (for writes) both
    /// dirty bits. Fails with `InvalidAddress` when the address or page is
    /// out of range.
    pub fn access(&self, pid: Pid, addr: u32, is_write: bool) -> SimResult<()> {
        let layout = self.layout_of(pid, addr)?;
        if addr as usize >= layout.memory_size {
            return Err(SimError::InvalidAddress { pid, addr });
        }
        let page = addr as usize / self.frame_size;
        if page >= layout.page_count() {
            return Err(SimError::InvalidAddress { pid, addr });
        }

        loop {
            {
                let mut state = self.state.lock().unwrap();
                let resident = layout.with_page_table(|table| {
                    let entry = &mut table.entries[page];
                    if entry.loaded {
                        entry.accessed = true;
                        if is_write {
                            entry.dirty = true;
                        }
                        entry.frame
                    } else {
                        None
                    }
                });
                if let Some(index) = resident {
                    let frame = &mut state.frames[index];
                    frame.last_accessed = SystemTime::now();
                    if is_write {
                        frame.dirty = true;
                    }
                    return Ok(());
                }
            }
            // Not resident; fault it in and re-check, since a concurrent
            // eviction may race the window between fault and update.
            self.page_fault(pid, page)?;
        }
    }

    /// Handles a page fault for (pid, page).
    ///
    /// Takes a frame from the free list, or evicts the FIFO head. Dirty
    /// victims are written back; every eviction bumps the replacement
    /// counter and the victim entry keeps its dirty bit while losing
    /// residency. The faulted page's entry is marked loaded and the frame
    /// joins the FIFO tail.
    pub fn page_fault(&self, pid: Pid, page: usize) -> SimResult<()> {
        let layout = self.layout_of(pid, (page * self.frame_size) as u32)?;
        if page >= layout.page_count() {
            return Err(SimError::InvalidAddress {
                pid,
                addr: (page * self.frame_size) as u32,
            });
        }

        let io = {
            let mut state = self.state.lock().unwrap();
            state.faults += 1;
            debug!(
                "page fault for pid {} page {} (total {})",
                pid, page, state.faults
            );

            let (index, writeback) = match state.free.pop_front() {
                Some(index) => (index, None),
                None => {
                    let victim = state.fifo.pop_front().ok_or_else(|| {
                        SimError::BackingStore("no frames available to evict".into())
                    })?;
                    let writeback = self.evict(&mut state, victim);
                    (victim, writeback)
                }
            };

            let frame = &mut state.frames[index];
            frame.pid = Some(pid);
            frame.page = page;
            frame.occupied = true;
            frame.dirty = false;
            frame.last_accessed = SystemTime::now();
            state.fifo.push_back(index);

            layout.with_page_table(|table| {
                let entry = &mut table.entries[page];
                entry.frame = Some(index);
                entry.loaded = true;
                entry.accessed = true;
                entry.dirty = false;
            });

            PendingIo {
                writeback,
                load: (pid, page),
            }
        };

        // Frame already reserved; the I/O happens outside the pager lock.
        if let Some((victim_pid, victim_page, words)) = io.writeback {
            if let Err(e) = self.store.store(victim_pid, victim_page, &words) {
                error!("backing store write-back failed: {}", e);
                self.poisoned.store(true, Ordering::SeqCst);
            }
        }
        match self.store.load(io.load.0, io.load.1) {
            Ok(_) => {}
            Err(e) => {
                error!("backing store load failed: {}", e);
                self.poisoned.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Evicts the occupant of `victim` inside the critical section,
    /// returning the dirty write-back payload, if any.
    fn evict(&self, state: &mut PoolState, victim: usize) -> Option<(Pid, usize, Vec<u16>)> {
        let (victim_pid, victim_page, was_dirty) = {
            let frame = &state.frames[victim];
            (frame.pid, frame.page, frame.dirty)
        };

        let victim_pid = victim_pid?;
        if let Some(layout) = state.layouts.get(&victim_pid) {
            layout.with_page_table(|table| {
                if let Some(entry) = table.entries.get_mut(victim_page) {
                    entry.loaded = false;
                    entry.frame = None;
                    entry.dirty = was_dirty;
                }
            });
        }

        state.frames[victim].clear();
        state.replacements += 1;
        debug!(
            "evicted pid {} page {} from frame {} (dirty: {})",
            victim_pid, victim_page, victim, was_dirty
        );

        if was_dirty {
            // The payload is a diagnostic filler; frames carry bookkeeping,
            // not byte images.
            let words = vec![victim as u16; self.frame_size / 2];
            Some((victim_pid, victim_page, words))
        } else {
            None
        }
    }

    /// Releases every frame owned by `pid`: removed from the FIFO queue,
    /// cleared, and returned to the free list. Dirty pages are not written
    /// back. Calling this twice is equivalent to calling it once.
    pub fn free_process_pages(&self, pid: Pid) {
        let mut state = self.state.lock().unwrap();
        let PoolState {
            frames, free, fifo, ..
        } = &mut *state;

        fifo.retain(|&index| frames[index].pid != Some(pid));

        let mut released = 0;
        for frame in frames.iter_mut() {
            if frame.occupied && frame.pid == Some(pid) {
                let index = frame.index;
                frame.clear();
                free.push_back(index);
                released += 1;
            }
        }

        if let Some(layout) = state.layouts.get(&pid) {
            layout.with_page_table(|table| {
                for entry in table.entries.iter_mut() {
                    entry.loaded = false;
                    entry.frame = None;
                }
            });
        }

        if released > 0 {
            debug!("released {} frames of pid {}", released, pid);
        }
    }

    /// Current pager statistics.
    pub fn statistics(&self) -> PagingStats {
        let state = self.state.lock().unwrap();
        PagingStats {
            faults: state.faults,
            replacements: state.replacements,
            frames_used: self.num_frames - state.free.len(),
        }
    }

    /// Snapshot of every frame, in index order.
    pub fn frame_table(&self) -> Vec<FrameView> {
        self.state.lock().unwrap().frames.clone()
    }

    /// Current FIFO queue contents, head first. Diagnostic accessor.
    pub fn fifo_order(&self) -> Vec<usize> {
        self.state.lock().unwrap().fifo.iter().copied().collect()
    }

    fn layout_of(&self, pid: Pid, addr: u32) -> SimResult<Arc<ProcessMemoryLayout>> {
        self.state
            .lock()
            .unwrap()
            .layouts
            .get(&pid)
            .cloned()
            .ok_or(SimError::InvalidAddress { pid, addr })
    }
}
