//! Session records and the process table.
//!
//! A `Session` is the runtime record of one submitted process: its program,
//! variable table, tick counters, completion state, and memory-layout handle.
//! The `ProcessTable` owns every session behind one coarse mutex that is held
//! only for short map operations; heavier work (interpretation, paging) runs
//! on cloned handles and snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::common::error::{SimError, SimResult};
use crate::common::Pid;
use crate::mem::layout::{ProcessMemoryLayout, MAX_SYMBOLS};
use crate::proc::program::Instruction;

/// Crash record populated when a program halts on a fatal instruction error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashInfo {
    /// The invalid address, when the crash was an access violation.
    pub addr: u32,
    /// Human-readable cause.
    pub message: String,
    /// When the crash happened.
    pub at: SystemTime,
}

/// One bound variable: its current value and its fixed symbol-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    /// Current 16-bit value.
    pub value: u16,
    /// Slot index inside the symbol-table segment; byte offset = slot * 2.
    pub slot: usize,
}

/// Runtime record of one submitted process.
#[derive(Debug)]
pub struct Session {
    /// Process name as given at submission.
    pub name: String,
    /// Creation timestamp.
    pub created: SystemTime,
    /// Virtual memory size in bytes.
    pub memory_size: usize,
    /// Parsed program; empty for synthetic scheduler-test processes.
    pub program: Vec<Instruction>,
    /// Variable table, capped at [`MAX_SYMBOLS`] entries.
    pub vars: HashMap<String, Variable>,
    /// Lines emitted by `PRINT` and the synthetic worker loop.
    pub output: Vec<String>,
    /// Ticks this session spent executing.
    pub active_ticks: u64,
    /// Ticks this session spent waiting.
    pub idle_ticks: u64,
    /// Set once the program has run to completion or crashed.
    pub finished: bool,
    /// True while a worker is executing this session's program.
    pub running: bool,
    /// Populated when the program halted on a fatal error.
    pub crash: Option<CrashInfo>,
    /// Memory-layout handle; shared with the pager's registry.
    pub layout: Arc<ProcessMemoryLayout>,
    /// Core this session last ran on.
    pub assigned_core: Option<usize>,
}

impl Session {
    /// Creates a fresh session with an empty variable table.
    pub fn new(
        name: String,
        memory_size: usize,
        program: Vec<Instruction>,
        layout: Arc<ProcessMemoryLayout>,
    ) -> Self {
        Self {
            name,
            created: SystemTime::now(),
            memory_size,
            program,
            vars: HashMap::new(),
            output: Vec::new(),
            active_ticks: 0,
            idle_ticks: 0,
            finished: false,
            running: false,
            crash: None,
            layout,
            assigned_core: None,
        }
    }

    /// Looks up a variable's current value.
    pub fn var_value(&self, name: &str) -> Option<u16> {
        self.vars.get(name).map(|v| v.value)
    }

    /// Binds `name` to `value`, assigning a symbol-table slot on first bind.
    ///
    /// Returns the variable's slot, or `None` when the table already holds
    /// [`MAX_SYMBOLS`] entries and `name` is new; the caller is expected to
    /// skip the binding with a diagnostic.
    pub fn bind_var(&mut self, name: &str, value: u16) -> Option<usize> {
        if let Some(var) = self.vars.get_mut(name) {
            var.value = value;
            return Some(var.slot);
        }
        if self.vars.len() >= MAX_SYMBOLS {
            return None;
        }
        let slot = self.vars.len();
        self.vars.insert(name.to_string(), Variable { value, slot });
        Some(slot)
    }

    /// Marks the session crashed and finished with the given record.
    pub fn record_crash(&mut self, addr: u32, message: String) {
        self.crash = Some(CrashInfo {
            addr,
            message,
            at: SystemTime::now(),
        });
        self.finished = true;
    }
}

/// Lightweight copy of a session's queryable state.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub pid: Pid,
    pub name: String,
    pub created: SystemTime,
    pub memory_size: usize,
    pub program_len: usize,
    pub var_count: usize,
    pub output: Vec<String>,
    pub active_ticks: u64,
    pub idle_ticks: u64,
    pub finished: bool,
    pub crash: Option<CrashInfo>,
    pub assigned_core: Option<usize>,
}

struct TableState {
    sessions: HashMap<Pid, Session>,
    next_pid: Pid,
}

/// Mutex-guarded process table; the exclusive owner of every `Session`.
pub struct ProcessTable {
    state: Mutex<TableState>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    /// Creates an empty table; the first assigned pid is 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                sessions: HashMap::new(),
                next_pid: 1,
            }),
        }
    }

    /// Inserts a new session and returns its pid.
    pub fn create(
        &self,
        name: String,
        memory_size: usize,
        program: Vec<Instruction>,
        layout: Arc<ProcessMemoryLayout>,
    ) -> Pid {
        let mut state = self.state.lock().unwrap();
        let pid = state.next_pid;
        state.next_pid += 1;
        state
            .sessions
            .insert(pid, Session::new(name, memory_size, program, layout));
        pid
    }

    /// Runs `f` with mutable access to one session under the table lock.
    ///
    /// Returns `Err(NotInitialized)` mapped by callers for unknown pids as
    /// appropriate; here an unknown pid simply yields `None`.
    pub fn with_session<R>(&self, pid: Pid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut state = self.state.lock().unwrap();
        state.sessions.get_mut(&pid).map(f)
    }

    /// Returns the layout handle for a pid, if the session exists.
    pub fn layout(&self, pid: Pid) -> Option<Arc<ProcessMemoryLayout>> {
        self.with_session(pid, |s| Arc::clone(&s.layout))
    }

    /// Returns whether the session has finished; unknown pids read as finished.
    pub fn is_finished(&self, pid: Pid) -> bool {
        self.with_session(pid, |s| s.finished).unwrap_or(true)
    }

    /// Marks a session finished.
    pub fn mark_finished(&self, pid: Pid) {
        self.with_session(pid, |s| s.finished = true);
    }

    /// Looks up a pid by process name (first match).
    pub fn pid_by_name(&self, name: &str) -> Option<Pid> {
        let state = self.state.lock().unwrap();
        let mut pids: Vec<Pid> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.name == name)
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids.first().copied()
    }

    /// Snapshot view of one session.
    pub fn view(&self, pid: Pid) -> SimResult<SessionView> {
        let state = self.state.lock().unwrap();
        let session = state.sessions.get(&pid).ok_or(SimError::UnknownPid(pid))?;
        Ok(view_of(pid, session))
    }

    /// Snapshot views of every session, ordered by pid.
    pub fn views(&self) -> Vec<SessionView> {
        let state = self.state.lock().unwrap();
        let mut views: Vec<SessionView> = state
            .sessions
            .iter()
            .map(|(pid, s)| view_of(*pid, s))
            .collect();
        views.sort_by_key(|v| v.pid);
        views
    }

    /// Number of sessions ever created and still held.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// True when the table holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn view_of(pid: Pid, session: &Session) -> SessionView {
    SessionView {
        pid,
        name: session.name.clone(),
        created: session.created,
        memory_size: session.memory_size,
        program_len: session.program.len(),
        var_count: session.vars.len(),
        output: session.output.clone(),
        active_ticks: session.active_ticks,
        idle_ticks: session.idle_ticks,
        finished: session.finished,
        crash: session.crash.clone(),
        assigned_core: session.assigned_core,
    }
}
