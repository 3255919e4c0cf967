//! Instruction interpreter.
//!
//! Executes one process's program strictly in order on its assigned worker.
//! Every memory-touching instruction routes through the pager; variable
//! lookups and address computation happen under the session lock, which is
//! released before any pager call (lock order: session → pager → backing).
//!
//! Fatal per-instruction errors (division by zero, access violations) stop
//! the program, mark the session finished, and populate the crash record;
//! the remaining instructions are not executed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::common::Pid;
use crate::mem::pager::FramePool;
use crate::proc::program::Instruction;
use crate::proc::session::ProcessTable;

/// Clamps an arithmetic result into the 16-bit unsigned range.
fn clamp_u16(value: i64) -> u16 {
    value.clamp(0, u16::MAX as i64) as u16
}

/// Outcome of one instruction.
enum Step {
    /// Continue with the next instruction.
    Continue,
    /// Fatal error; the crash record has been written.
    Halt,
}

/// Executes programs for sessions held in a shared process table.
pub struct Interpreter {
    table: Arc<ProcessTable>,
    pool: Arc<FramePool>,
    delay: Duration,
}

impl Interpreter {
    /// Creates an interpreter over the shared table and pager.
    ///
    /// `delay_ms` is slept between instructions to make quantum-granularity
    /// observable; 0 disables the pause.
    pub fn new(table: Arc<ProcessTable>, pool: Arc<FramePool>, delay_ms: u64) -> Self {
        Self {
            table,
            pool,
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Runs `pid`'s program to completion or until a fatal error.
    ///
    /// The caller (worker) is responsible for setting `finished` afterward;
    /// crashes set it eagerly through the crash record.
    pub fn run(&self, pid: Pid) {
        let len = match self.table.with_session(pid, |s| s.program.len()) {
            Some(len) => len,
            None => return,
        };

        for index in 0..len {
            let instruction = match self.table.with_session(pid, |s| s.program[index].clone()) {
                Some(i) => i,
                None => return,
            };

            debug!("pid {} instruction {}/{}", pid, index + 1, len);
            match self.execute(pid, &instruction) {
                Step::Continue => {
                    self.table.with_session(pid, |s| s.active_ticks += 1);
                }
                Step::Halt => {
                    self.table.with_session(pid, |s| s.active_ticks += 1);
                    return;
                }
            }

            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
    }

    fn execute(&self, pid: Pid, instruction: &Instruction) -> Step {
        match instruction {
            Instruction::Declare { name, value } => self.exec_declare(pid, name, *value),
            Instruction::Add { dst, lhs, rhs } => self.exec_arith(pid, "+", dst, lhs, rhs),
            Instruction::Sub { dst, lhs, rhs } => self.exec_arith(pid, "-", dst, lhs, rhs),
            Instruction::Mul { dst, lhs, rhs } => self.exec_arith(pid, "*", dst, lhs, rhs),
            Instruction::Div { dst, lhs, rhs } => self.exec_arith(pid, "/", dst, lhs, rhs),
            Instruction::Write { addr, src } => self.exec_write(pid, *addr, src),
            Instruction::Read { dst, addr } => self.exec_read(pid, dst, *addr),
            Instruction::Print { arg } => self.exec_print(pid, arg),
        }
    }

    /// DECLARE: bind the clamped immediate and write the variable's
    /// symbol-table slot through the pager.
    fn exec_declare(&self, pid: Pid, name: &str, value: i64) -> Step {
        let value = clamp_u16(value);
        let slot = self
            .table
            .with_session(pid, |s| s.bind_var(name, value))
            .flatten();

        let slot = match slot {
            Some(slot) => slot,
            None => {
                warn!(
                    "pid {}: symbol table full, DECLARE {} ignored",
                    pid, name
                );
                return Step::Continue;
            }
        };

        let addr = (slot * 2) as u32;
        if let Err(e) = self.pool.access(pid, addr, true) {
            return self.crash(pid, addr, e.to_string());
        }
        info!("pid {} declared {} = {}", pid, name, value);
        Step::Continue
    }

    /// ADD/SUB/MUL/DIV: resolve operands, clamp, store to `dst`, and write
    /// a hash-derived address to provoke paging traffic.
    fn exec_arith(&self, pid: Pid, op: &str, dst: &str, lhs: &str, rhs: &str) -> Step {
        let (resolved, memory_size) = match self.table.with_session(pid, |s| {
            (
                (resolve_operand(s, lhs), resolve_operand(s, rhs)),
                s.memory_size,
            )
        }) {
            Some(r) => r,
            None => return Step::Halt,
        };

        let (lhs_val, rhs_val) = match resolved {
            (Some(l), Some(r)) => (l as i64, r as i64),
            (None, _) => return self.crash(pid, 0, format!("invalid operand '{}'", lhs)),
            (_, None) => return self.crash(pid, 0, format!("invalid operand '{}'", rhs)),
        };

        let result = match op {
            "+" => lhs_val + rhs_val,
            "-" => lhs_val - rhs_val,
            "*" => lhs_val * rhs_val,
            _ => {
                if rhs_val == 0 {
                    return self.crash(pid, 0, "division by zero".to_string());
                }
                lhs_val / rhs_val
            }
        };
        let result = clamp_u16(result);

        let bound = self
            .table
            .with_session(pid, |s| s.bind_var(dst, result))
            .flatten();
        if bound.is_none() {
            warn!("pid {}: symbol table full, result {} dropped", pid, dst);
        }

        // Advisory address for paging pressure only; the variable's
        // canonical storage is its symbol-table slot.
        let addr = (hash_name(dst) % memory_size as u64) as u32;
        if let Err(e) = self.pool.access(pid, addr, true) {
            return self.crash(pid, addr, e.to_string());
        }

        info!(
            "pid {} computed {} = {} {} {} = {}",
            pid, dst, lhs_val, op, rhs_val, result
        );
        Step::Continue
    }

    /// WRITE: clamp the source value and write it through the pager.
    fn exec_write(&self, pid: Pid, addr: u32, src: &str) -> Step {
        let (value, memory_size) = match self
            .table
            .with_session(pid, |s| (resolve_operand(s, src), s.memory_size))
        {
            Some(r) => r,
            None => return Step::Halt,
        };
        let value = match value {
            Some(v) => v,
            None => return self.crash(pid, addr, format!("invalid source '{}'", src)),
        };

        if addr as usize >= memory_size {
            return self.crash(pid, addr, format!("address {:#x} out of bounds", addr));
        }
        if let Err(e) = self.pool.access(pid, addr, true) {
            return self.crash(pid, addr, e.to_string());
        }

        info!("pid {} wrote {} ({}) to {:#x}", pid, src, value, addr);
        Step::Continue
    }

    /// READ: read through the pager and store the synthesized value to `dst`.
    fn exec_read(&self, pid: Pid, dst: &str, addr: u32) -> Step {
        let memory_size = match self.table.with_session(pid, |s| s.memory_size) {
            Some(m) => m,
            None => return Step::Halt,
        };

        if addr as usize >= memory_size {
            return self.crash(pid, addr, format!("address {:#x} out of bounds", addr));
        }
        if let Err(e) = self.pool.access(pid, addr, false) {
            return self.crash(pid, addr, e.to_string());
        }

        // Frames carry bookkeeping, not byte images; reads synthesize a
        // deterministic value from the address.
        let value = (addr % 1000) as u16;
        let bound = self
            .table
            .with_session(pid, |s| s.bind_var(dst, value))
            .flatten();
        if bound.is_none() {
            warn!("pid {}: symbol table full, READ into {} ignored", pid, dst);
        }

        info!("pid {} read {} = {} from {:#x}", pid, dst, value, addr);
        Step::Continue
    }

    /// PRINT: resolve the argument and append to the process output.
    fn exec_print(&self, pid: Pid, arg: &str) -> Step {
        let line = match self.table.with_session(pid, |s| render_print(s, arg)) {
            Some(line) => line,
            None => return Step::Halt,
        };

        info!("pid {} prints: {}", pid, line);
        self.table.with_session(pid, |s| s.output.push(line));
        Step::Continue
    }

    /// Records a crash and halts the program.
    fn crash(&self, pid: Pid, addr: u32, message: String) -> Step {
        warn!("pid {} crashed: {}", pid, message);
        self.table
            .with_session(pid, |s| s.record_crash(addr, message));
        Step::Halt
    }
}

/// Resolves an arithmetic or WRITE operand: variable lookup first, then
/// decimal literal clamped to u16 range.
fn resolve_operand(session: &crate::proc::session::Session, token: &str) -> Option<u16> {
    if let Some(value) = session.var_value(token) {
        return Some(value);
    }
    token.parse::<i64>().ok().map(clamp_u16)
}

/// Renders a PRINT argument against the session's variables.
///
/// A bare variable prints its value; `"literal" + var` concatenates; a
/// quoted literal prints unquoted; anything else prints as given.
fn render_print(session: &crate::proc::session::Session, arg: &str) -> String {
    if let Some(value) = session.var_value(arg) {
        return value.to_string();
    }

    if let Some(plus) = arg.find(" + ") {
        let left = arg[..plus].trim();
        let right = arg[plus + 3..].trim();
        let left = left
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(left);
        return match session.var_value(right) {
            Some(value) => format!("{}{}", left, value),
            None => format!("{}{}", left, right),
        };
    }

    arg.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(arg)
        .to_string()
}

/// Stable hash of a variable name for the advisory pressure address.
fn hash_name(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}
