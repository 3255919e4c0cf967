//! Memory subsystem: per-process layout, backing store, and the frame pool.
//!
//! This module provides:
//! 1. **Layout:** Fixed segments (symbol table, code, stack, heap) and the page table.
//! 2. **Backing store:** The persistent line-addressed page archive keyed by (pid, page).
//! 3. **Pager:** The fixed frame pool with free list, FIFO victim queue, and the
//!    page-fault handler, the only path through which programs touch memory.

/// Persistent page archive and the `PageStore` seam.
pub mod backing;

/// Per-process segments and page tables.
pub mod layout;

/// Frame pool, FIFO replacement, and the memory-access API.
pub mod pager;

pub use backing::{FileBackingStore, PageStore};
pub use layout::{MemorySegment, PageEntry, ProcessMemoryLayout, SegmentKind};
pub use pager::{FramePool, FrameView, PagingStats};
