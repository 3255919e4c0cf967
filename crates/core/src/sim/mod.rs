//! Top-level simulator aggregate.
//!
//! The `Simulator` owns every subsystem as an explicit object (process
//! table, backing store, frame pool, tick counters, scheduler) and is the
//! single reference the shell holds. It exposes:
//! 1. **Submission:** `submit` / `submit_synthetic`, with all validation up front.
//! 2. **Lifecycle:** `start`, `wait_until_done`, `shutdown`.
//! 3. **Queries:** process views, frame/page tables, statistics, snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::common::error::{SimError, SimResult};
use crate::common::Pid;
use crate::config::Config;
use crate::mem::backing::FileBackingStore;
use crate::mem::layout::{MemorySegment, PageEntry, ProcessMemoryLayout};
use crate::mem::pager::{FramePool, FrameView, PagingStats};
use crate::proc::program::parse_program;
use crate::proc::session::{ProcessTable, SessionView};
use crate::report::MemorySnapshots;
use crate::sched::Scheduler;
use crate::stats::{TickCounters, TickSnapshot};

/// File name of the persistent page archive.
pub const BACKING_STORE_FILE: &str = "csopesy-backing-store.txt";

/// The simulator aggregate; construct one per run.
pub struct Simulator {
    config: Config,
    table: Arc<ProcessTable>,
    pool: Arc<FramePool>,
    ticks: Arc<TickCounters>,
    scheduler: Scheduler,
    snapshots: MemorySnapshots,
    output_dir: PathBuf,
}

impl Simulator {
    /// Builds a simulator writing its artifacts to the current directory.
    pub fn new(config: Config) -> SimResult<Self> {
        Self::with_output_dir(config, ".")
    }

    /// Builds a simulator rooting every persisted artifact under `dir`.
    ///
    /// Opening the backing store here is the fatal-infrastructure gate: a
    /// store that cannot be created fails construction outright.
    pub fn with_output_dir<P: AsRef<Path>>(config: Config, dir: P) -> SimResult<Self> {
        let output_dir = dir.as_ref().to_path_buf();

        let store = Arc::new(FileBackingStore::create(
            output_dir.join(BACKING_STORE_FILE),
            config.mem_per_frame,
            config.backing_store_size,
        )?);

        let table = Arc::new(ProcessTable::new());
        let pool = Arc::new(FramePool::new(
            config.num_frames,
            config.mem_per_frame,
            store,
        )?);
        let ticks = Arc::new(TickCounters::new());
        let scheduler = Scheduler::new(
            config.clone(),
            Arc::clone(&table),
            Arc::clone(&pool),
            Arc::clone(&ticks),
            output_dir.clone(),
        );
        let snapshots = MemorySnapshots::new(&output_dir, config.mem_per_frame);

        Ok(Self {
            config,
            table,
            pool,
            ticks,
            scheduler,
            snapshots,
            output_dir,
        })
    }

    /// The configuration this simulator runs under.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory holding every persisted artifact.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Starts the scheduler threads.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Submits a process with a program source string.
    ///
    /// Validation happens before any state is touched: the scheduler must
    /// be started, the memory size must be a power of two inside the
    /// configured range, and the program must parse to 1..=50 instructions.
    pub fn submit(&self, name: &str, memory_size: usize, source: &str) -> SimResult<Pid> {
        let program = parse_program(source)?;
        self.admit(name, memory_size, program)
    }

    /// Submits a synthetic scheduler-test process (no program); the worker
    /// emits `prints-per-process` log lines instead.
    pub fn submit_synthetic(&self, name: &str, memory_size: usize) -> SimResult<Pid> {
        self.admit(name, memory_size, Vec::new())
    }

    fn admit(
        &self,
        name: &str,
        memory_size: usize,
        program: Vec<crate::proc::program::Instruction>,
    ) -> SimResult<Pid> {
        if !self.scheduler.is_started() {
            return Err(SimError::NotInitialized);
        }
        if self.pool.is_poisoned() {
            return Err(SimError::BackingStore(
                "backing store failed; submissions refused".into(),
            ));
        }
        if name.is_empty() {
            return Err(SimError::InvalidProgram("process name is empty".into()));
        }
        if !valid_memory_size(memory_size, &self.config) {
            return Err(SimError::InvalidMemorySize(memory_size));
        }

        let layout = Arc::new(ProcessMemoryLayout::new(
            memory_size,
            self.config.mem_per_frame,
        ));
        let pid = self
            .table
            .create(name.to_string(), memory_size, program, Arc::clone(&layout));
        self.pool.register(pid, layout);
        self.scheduler.enqueue(pid)?;

        info!("submitted pid {} ({}), {} bytes", pid, name, memory_size);
        Ok(pid)
    }

    /// Polls until every submitted session has finished, or the timeout
    /// elapses. Returns true when all sessions finished.
    pub fn wait_until_done(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let views = self.table.views();
            if !views.is_empty() && views.iter().all(|v| v.finished) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stops the scheduler and joins every thread.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Snapshot views of every session, ordered by pid.
    pub fn processes(&self) -> Vec<SessionView> {
        self.table.views()
    }

    /// Snapshot view of one session.
    pub fn process(&self, pid: Pid) -> SimResult<SessionView> {
        self.table.view(pid)
    }

    /// Looks up a pid by name.
    pub fn pid_by_name(&self, name: &str) -> Option<Pid> {
        self.table.pid_by_name(name)
    }

    /// Current paging statistics.
    pub fn paging_stats(&self) -> PagingStats {
        self.pool.statistics()
    }

    /// Global tick counters.
    pub fn tick_totals(&self) -> TickSnapshot {
        self.ticks.snapshot()
    }

    /// Frame-table snapshot, in index order.
    pub fn frame_table(&self) -> Vec<FrameView> {
        self.pool.frame_table()
    }

    /// Page-table snapshot of one process.
    pub fn page_table(&self, pid: Pid) -> SimResult<Vec<PageEntry>> {
        self.table
            .layout(pid)
            .map(|layout| layout.page_table_snapshot())
            .ok_or(SimError::UnknownPid(pid))
    }

    /// Segment map of one process.
    pub fn segments(&self, pid: Pid) -> SimResult<Vec<MemorySegment>> {
        self.table
            .layout(pid)
            .map(|layout| layout.segments.clone())
            .ok_or(SimError::UnknownPid(pid))
    }

    /// Captures a rate-limited memory snapshot file.
    pub fn snapshot_memory(&self) -> SimResult<Option<PathBuf>> {
        self.snapshots.capture(&self.pool.frame_table())
    }

    /// Writes `memory_report.txt` under the output directory.
    pub fn write_memory_report(&self) -> SimResult<()> {
        crate::report::write_memory_report(
            self.output_dir.join("memory_report.txt"),
            &self.table.views(),
            self.pool.statistics(),
            self.ticks.snapshot(),
        )
    }

    /// Writes `csopesy-log.txt` under the output directory.
    pub fn write_sim_log(&self) -> SimResult<()> {
        crate::report::write_sim_log(
            self.output_dir.join("csopesy-log.txt"),
            &self.table.views(),
            self.ticks.snapshot(),
        )
    }
}

/// Memory sizes must be powers of two within the configured range.
fn valid_memory_size(size: usize, config: &Config) -> bool {
    size.is_power_of_two() && size >= config.min_memory_size && size <= config.max_memory_size
}
