//! Simulation statistics.
//!
//! This module tracks scheduling progress across the whole simulator:
//! 1. **Active ticks:** Quantum boundaries (RR) or dispatches that made progress.
//! 2. **Idle ticks:** Quantum boundaries and worker wakeups that found no work.
//!
//! Both counters are monotone; per-session tick counts live on the session
//! records. Paging statistics come from the frame pool.

use std::sync::atomic::{AtomicU64, Ordering};

pub use crate::mem::pager::PagingStats;

/// Point-in-time copy of the global tick counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSnapshot {
    /// Total active ticks across all cores.
    pub active: u64,
    /// Total idle ticks across all cores.
    pub idle: u64,
}

/// Global active/idle tick counters, summed across cores.
#[derive(Debug, Default)]
pub struct TickCounters {
    active: AtomicU64,
    idle: AtomicU64,
}

impl TickCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one active tick.
    pub fn tick_active(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one idle tick.
    pub fn tick_idle(&self) {
        self.idle.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of both counters.
    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            active: self.active.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
        }
    }
}
