//! Scheduler and worker cores.
//!
//! One worker thread per configured core, each blocking on its own
//! mutex+condvar ready queue. Two dispatch disciplines:
//! 1. **Fixed-core (FCFS):** core = (pid - 1) mod num_cpu at submission;
//!    the worker runs the program to completion and releases its frames.
//! 2. **Round-robin:** a dispatcher thread rotates through cores, handing
//!    the ready-queue head to the next core, sleeping one quantum, then
//!    either releasing the finished process's frames or requeueing it.
//!
//! Preemption is modeled by the quantum-bounded dispatch, not by
//! interrupting the interpreter: a pid runs on one worker at a time, and a
//! dispatch that finds it still running (or already finished) is a no-op.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use log::{error, info};

use crate::common::clock::format_timestamp;
use crate::common::error::{SimError, SimResult};
use crate::common::Pid;
use crate::config::{Config, SchedulerKind};
use crate::interp::Interpreter;
use crate::mem::pager::FramePool;
use crate::proc::session::ProcessTable;
use crate::stats::TickCounters;

/// Delay between synthetic work steps, in milliseconds.
const SYNTHETIC_STEP_MS: u64 = 50;

/// One core's ready queue.
struct CoreQueue {
    queue: Mutex<VecDeque<Pid>>,
    cv: Condvar,
}

impl CoreQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }
}

/// State shared between the scheduler, the dispatcher, and every worker.
struct Shared {
    config: Config,
    table: Arc<ProcessTable>,
    pool: Arc<FramePool>,
    ticks: Arc<TickCounters>,
    cores: Vec<CoreQueue>,
    ready: Mutex<VecDeque<Pid>>,
    stop: AtomicBool,
    output_dir: PathBuf,
}

/// Multi-core scheduler; owns the worker threads and (in RR) the dispatcher.
pub struct Scheduler {
    shared: Arc<Shared>,
    interpreter: Arc<Interpreter>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Scheduler {
    /// Creates the scheduler; no threads run until [`Scheduler::start`].
    pub fn new(
        config: Config,
        table: Arc<ProcessTable>,
        pool: Arc<FramePool>,
        ticks: Arc<TickCounters>,
        output_dir: PathBuf,
    ) -> Self {
        let cores = (0..config.num_cpu).map(|_| CoreQueue::new()).collect();
        let interpreter = Arc::new(Interpreter::new(
            Arc::clone(&table),
            Arc::clone(&pool),
            config.delays_per_exec,
        ));
        Self {
            shared: Arc::new(Shared {
                config,
                table,
                pool,
                ticks,
                cores,
                ready: Mutex::new(VecDeque::new()),
                stop: AtomicBool::new(false),
                output_dir,
            }),
            interpreter,
            workers: Mutex::new(Vec::new()),
            dispatcher: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// True once `start` has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spawns one worker per core and, under round-robin, the dispatcher.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.workers.lock().unwrap();
        for core_id in 0..self.shared.config.num_cpu {
            let shared = Arc::clone(&self.shared);
            let interpreter = Arc::clone(&self.interpreter);
            workers.push(
                thread::Builder::new()
                    .name(format!("core-{}", core_id))
                    .spawn(move || worker_loop(shared, interpreter, core_id))
                    .expect("spawn worker"),
            );
        }

        if self.shared.config.scheduler == SchedulerKind::Rr {
            let shared = Arc::clone(&self.shared);
            *self.dispatcher.lock().unwrap() = Some(
                thread::Builder::new()
                    .name("dispatcher".into())
                    .spawn(move || dispatcher_loop(shared))
                    .expect("spawn dispatcher"),
            );
        }

        info!(
            "scheduler started: {:?}, {} cores",
            self.shared.config.scheduler, self.shared.config.num_cpu
        );
    }

    /// Enqueues a freshly created pid under the active discipline.
    pub fn enqueue(&self, pid: Pid) -> SimResult<()> {
        if !self.is_started() {
            return Err(SimError::NotInitialized);
        }

        match self.shared.config.scheduler {
            SchedulerKind::Rr => {
                self.shared.ready.lock().unwrap().push_back(pid);
            }
            SchedulerKind::Fcfs => {
                let core = (pid as usize - 1) % self.shared.config.num_cpu;
                self.shared.cores[core]
                    .queue
                    .lock()
                    .unwrap()
                    .push_back(pid);
                self.shared.cores[core].cv.notify_one();
            }
        }
        Ok(())
    }

    /// Sets the stop flag, wakes every worker, and joins all threads.
    ///
    /// Workers drain their queues before exiting.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        for core in &self.shared.cores {
            core.cv.notify_all();
        }

        if let Some(dispatcher) = self.dispatcher.lock().unwrap().take() {
            let _ = dispatcher.join();
        }
        for worker in self.workers.lock().unwrap().drain(..) {
            let _ = worker.join();
        }
    }
}

/// Round-robin dispatcher: pop the ready head, hand it to the next core,
/// sleep one quantum, then release or requeue.
fn dispatcher_loop(shared: Arc<Shared>) {
    let quantum = Duration::from_millis(shared.config.quantum_cycles);
    let mut current_core = 0;

    while !shared.stop.load(Ordering::SeqCst) {
        let pid = shared.ready.lock().unwrap().pop_front();
        let Some(pid) = pid else {
            shared.ticks.tick_idle();
            thread::sleep(quantum);
            continue;
        };

        if !shared.pool.is_admitted(pid) {
            // Admission failed: requeue immediately but still consume the
            // quantum, so behavior stays observable under memory pressure.
            shared.ready.lock().unwrap().push_back(pid);
            shared.ticks.tick_idle();
            thread::sleep(quantum);
            current_core = (current_core + 1) % shared.config.num_cpu;
            continue;
        }

        let ticks_before = shared
            .table
            .with_session(pid, |s| s.active_ticks)
            .unwrap_or(0);

        shared.cores[current_core]
            .queue
            .lock()
            .unwrap()
            .push_back(pid);
        shared.cores[current_core].cv.notify_one();

        thread::sleep(quantum);

        let (ticks_after, finished) = shared
            .table
            .with_session(pid, |s| (s.active_ticks, s.finished))
            .unwrap_or((ticks_before, true));

        if finished {
            shared.pool.free_process_pages(pid);
            shared.pool.unregister(pid);
            info!("pid {} finished; frames released", pid);
        } else {
            shared.ready.lock().unwrap().push_back(pid);
        }

        if finished || ticks_after > ticks_before {
            shared.ticks.tick_active();
        } else {
            shared.ticks.tick_idle();
        }

        current_core = (current_core + 1) % shared.config.num_cpu;
    }
}

/// Worker loop for one core: block on the queue, run whatever arrives.
fn worker_loop(shared: Arc<Shared>, interpreter: Arc<Interpreter>, core_id: usize) {
    loop {
        let pid = {
            let core = &shared.cores[core_id];
            let mut queue = core.queue.lock().unwrap();
            while queue.is_empty() && !shared.stop.load(Ordering::SeqCst) {
                queue = core.cv.wait(queue).unwrap();
                if queue.is_empty() && !shared.stop.load(Ordering::SeqCst) {
                    // Woken with nothing to do.
                    shared.ticks.tick_idle();
                }
            }
            queue.pop_front()
        };

        let Some(pid) = pid else {
            // Stop is set and the queue is drained.
            return;
        };

        run_one(&shared, &interpreter, core_id, pid);
    }
}

/// Runs one dequeued pid to completion on this core.
///
/// A pid that is already finished, or still running on another core from an
/// earlier round-robin dispatch, makes this dispatch a no-op: within one
/// pid, instructions execute in program order on one worker at a time.
fn run_one(shared: &Arc<Shared>, interpreter: &Interpreter, core_id: usize, pid: Pid) {
    let claim = shared.table.with_session(pid, |s| {
        if s.finished || s.running {
            None
        } else {
            s.running = true;
            s.assigned_core = Some(core_id);
            Some(!s.program.is_empty())
        }
    });

    let Some(Some(has_program)) = claim else {
        return;
    };

    if has_program {
        interpreter.run(pid);
    } else {
        synthetic_run(shared, core_id, pid);
    }

    shared.table.with_session(pid, |s| {
        s.running = false;
        s.finished = true;
    });

    // Under fixed-core dispatch there is no dispatcher to run the lifecycle
    // hook, so the worker releases the frames itself.
    if shared.config.scheduler == SchedulerKind::Fcfs {
        shared.pool.free_process_pages(pid);
        shared.pool.unregister(pid);
    }
}

/// Synthetic scheduler-test process: a fixed number of log lines written to
/// `screen_NN.txt`, separated by a small delay to simulate work.
fn synthetic_run(shared: &Arc<Shared>, core_id: usize, pid: Pid) {
    let name = shared
        .table
        .with_session(pid, |s| s.name.clone())
        .unwrap_or_else(|| format!("screen_{:02}", pid));

    let path = shared.output_dir.join(format!("screen_{:02}.txt", pid));
    let mut file = match File::create(&path) {
        Ok(f) => f,
        Err(e) => {
            error!("cannot create '{}': {}", path.display(), e);
            return;
        }
    };

    for _ in 0..shared.config.prints_per_process {
        let line = format!(
            "({}) Core:{} \"Hello world from {}!\"",
            format_timestamp(SystemTime::now()),
            core_id,
            name
        );
        if let Err(e) = writeln!(file, "{}", line) {
            error!("cannot write '{}': {}", path.display(), e);
            return;
        }
        shared.table.with_session(pid, |s| {
            s.active_ticks += 1;
            s.output.push(line);
        });
        thread::sleep(Duration::from_millis(SYNTHETIC_STEP_MS));
    }
}
