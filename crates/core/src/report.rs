//! Report rendering and persisted artifacts.
//!
//! Presentation-layer writers over the simulator's query API:
//! 1. **Tables:** Frame-table, page-table, and segment renderers returning `String`.
//! 2. **Snapshots:** Rate-limited `memory_stamp_<n>.txt` files.
//! 3. **Reports:** `memory_report.txt` and `csopesy-log.txt`.
//!
//! Everything here consumes snapshots; nothing reaches into live state, so
//! these writers wrap the core without changing its behavior.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::common::clock::format_timestamp;
use crate::common::error::{SimError, SimResult};
use crate::common::Pid;
use crate::mem::layout::{MemorySegment, PageEntry};
use crate::mem::pager::{FrameView, PagingStats};
use crate::proc::session::SessionView;
use crate::stats::TickSnapshot;

/// Minimum spacing between accepted memory snapshots.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Renders the physical frame table with statistics, in the shell's
/// fixed-width layout.
pub fn render_frame_table(frames: &[FrameView], stats: PagingStats) -> String {
    let mut out = String::new();
    out.push_str("===== PHYSICAL FRAME TABLE =====\n");
    out.push_str("Frame# | Process ID | Page# | Occupied | Dirty | Last Accessed\n");
    out.push_str("-------|------------|-------|----------|-------|---------------\n");

    for frame in frames {
        if frame.occupied {
            let _ = writeln!(
                out,
                "{:>6} | {:>10} | {:>5} | {:>8} | {:>5} | {}",
                frame.index,
                frame.pid.map(|p| p.to_string()).unwrap_or_default(),
                frame.page,
                "Yes",
                if frame.dirty { "Yes" } else { "No" },
                format_timestamp(frame.last_accessed),
            );
        } else {
            let _ = writeln!(
                out,
                "{:>6} | {:>10} | {:>5} | {:>8} | {:>5} | N/A",
                frame.index, "N/A", "N/A", "No", "N/A",
            );
        }
    }

    let _ = writeln!(out, "\nSTATISTICS:");
    let _ = writeln!(out, "  Total Page Faults: {}", stats.faults);
    let _ = writeln!(out, "  Page Replacements: {}", stats.replacements);
    let _ = writeln!(
        out,
        "  Frames Used: {}/{}",
        stats.frames_used,
        frames.len()
    );
    let _ = writeln!(out, "  Free Frames: {}", frames.len() - stats.frames_used);
    out
}

/// Renders one process's page table.
pub fn render_page_table(pid: Pid, name: &str, entries: &[PageEntry], frame_size: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Page Table for Process {} ({}):", pid, name);
    let _ = writeln!(out, "Total Pages: {}", entries.len());
    let _ = writeln!(out, "Page Size: {} bytes\n", frame_size);
    out.push_str("Page# | Physical Frame | Loaded | Dirty | Accessed\n");
    out.push_str("------|----------------|--------|-------|----------\n");

    for (page, entry) in entries.iter().enumerate() {
        let frame = entry
            .frame
            .map(|f| f.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(
            out,
            "{:>5} | {:>14} | {:>6} | {:>5} | {:>8}",
            page,
            frame,
            if entry.loaded { "Yes" } else { "No" },
            if entry.dirty { "Yes" } else { "No" },
            if entry.accessed { "Yes" } else { "No" },
        );
    }
    out
}

/// Renders one process's segment map.
pub fn render_segments(pid: Pid, name: &str, segments: &[MemorySegment]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Memory Segments for Process {} ({}):", pid, name);
    out.push_str("Segment Type  | Start Address | End Address | Size (bytes)\n");
    out.push_str("--------------|---------------|-------------|-------------\n");

    for segment in segments {
        let _ = writeln!(
            out,
            "{:>13} | {:>13} | {:>11} | {:>12}",
            segment.kind.name(),
            segment.start,
            segment.start + segment.size.saturating_sub(1),
            segment.size,
        );
    }
    out
}

/// Writer for rate-limited `memory_stamp_<n>.txt` snapshots.
pub struct MemorySnapshots {
    dir: PathBuf,
    state: Mutex<SnapshotState>,
    frame_size: usize,
}

struct SnapshotState {
    counter: u32,
    last_accepted: Option<SystemTime>,
}

impl MemorySnapshots {
    /// Creates a snapshot writer rooted at `dir`.
    pub fn new<P: AsRef<Path>>(dir: P, frame_size: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            state: Mutex::new(SnapshotState {
                counter: 0,
                last_accepted: None,
            }),
            frame_size,
        }
    }

    /// Captures one snapshot of the frame table.
    ///
    /// Accepted at most once per second; a rejected capture returns
    /// `Ok(None)`. The file lists the timestamp, in-memory process count,
    /// external fragmentation, and occupied blocks top of memory first.
    pub fn capture(&self, frames: &[FrameView]) -> SimResult<Option<PathBuf>> {
        let now = SystemTime::now();
        let stamp = {
            let mut state = self.state.lock().unwrap();
            if let Some(last) = state.last_accepted {
                if now.duration_since(last).unwrap_or_default() < SNAPSHOT_INTERVAL {
                    return Ok(None);
                }
            }
            state.last_accepted = Some(now);
            state.counter += 1;
            state.counter
        };

        let mut pids: Vec<Pid> = frames.iter().filter_map(|f| f.pid).collect();
        pids.sort_unstable();
        pids.dedup();

        let free_frames = frames.iter().filter(|f| !f.occupied).count();
        let fragmentation_kb = free_frames * self.frame_size / 1024;

        let mut body = String::new();
        let _ = writeln!(body, "Timestamp: ({})", format_timestamp(now));
        let _ = writeln!(body, "Number of processes in memory: {}", pids.len());
        let _ = writeln!(
            body,
            "Total external fragmentation in KB: {}",
            fragmentation_kb
        );
        let _ = writeln!(body, "\n----end---- = {}\n", frames.len() * self.frame_size);
        for frame in frames.iter().rev().filter(|f| f.occupied) {
            let start = frame.index * self.frame_size;
            let _ = writeln!(body, "{}", start + self.frame_size);
            let _ = writeln!(
                body,
                "P{} (page {})",
                frame.pid.unwrap_or_default(),
                frame.page
            );
            let _ = writeln!(body, "{}\n", start);
        }
        let _ = writeln!(body, "----start---- = 0");

        let path = self.dir.join(format!("memory_stamp_{}.txt", stamp));
        fs::write(&path, body)
            .map_err(|e| SimError::ConfigIo(format!("cannot write '{}': {}", path.display(), e)))?;
        Ok(Some(path))
    }
}

/// Writes `memory_report.txt`: per-process memory, paging statistics, ticks.
pub fn write_memory_report<P: AsRef<Path>>(
    path: P,
    views: &[SessionView],
    stats: PagingStats,
    ticks: TickSnapshot,
) -> SimResult<()> {
    let mut body = String::new();
    let _ = writeln!(body, "CSOPESY Memory Report ({})", format_timestamp(SystemTime::now()));
    let _ = writeln!(body, "\nProcesses:");
    for view in views {
        let _ = writeln!(
            body,
            "  pid {:>3}  {:<16} {:>6} bytes  {}",
            view.pid,
            view.name,
            view.memory_size,
            if view.finished { "finished" } else { "running" },
        );
    }
    let total: usize = views.iter().map(|v| v.memory_size).sum();
    let _ = writeln!(body, "\nTotal process memory: {} bytes", total);
    let _ = writeln!(body, "Page faults: {}", stats.faults);
    let _ = writeln!(body, "Page replacements: {}", stats.replacements);
    let _ = writeln!(body, "Frames used: {}", stats.frames_used);
    let _ = writeln!(body, "CPU active ticks: {}", ticks.active);
    let _ = writeln!(body, "CPU idle ticks: {}", ticks.idle);

    fs::write(path.as_ref(), body).map_err(|e| {
        SimError::ConfigIo(format!("cannot write '{}': {}", path.as_ref().display(), e))
    })
}

/// Writes `csopesy-log.txt`: the run summary with per-process tick counts.
pub fn write_sim_log<P: AsRef<Path>>(
    path: P,
    views: &[SessionView],
    ticks: TickSnapshot,
) -> SimResult<()> {
    let mut body = String::new();
    let _ = writeln!(body, "CSOPESY Run Log ({})", format_timestamp(SystemTime::now()));
    for view in views {
        let state = match (&view.crash, view.finished) {
            (Some(crash), _) => format!("crashed at {:#x}: {}", crash.addr, crash.message),
            (None, true) => "finished".to_string(),
            (None, false) => "running".to_string(),
        };
        let _ = writeln!(
            body,
            "  pid {:>3}  {:<16} core {:<3} active {:>5} idle {:>5}  {}",
            view.pid,
            view.name,
            view.assigned_core
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            view.active_ticks,
            view.idle_ticks,
            state,
        );
    }
    let _ = writeln!(
        body,
        "\nTotal active ticks: {}\nTotal idle ticks: {}",
        ticks.active, ticks.idle
    );

    fs::write(path.as_ref(), body).map_err(|e| {
        SimError::ConfigIo(format!("cannot write '{}': {}", path.as_ref().display(), e))
    })
}
