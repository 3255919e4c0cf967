//! Simulator error definitions.
//!
//! This module defines the error taxonomy surfaced to the shell. It provides:
//! 1. **Submission errors:** Rejected before any state is mutated.
//! 2. **Runtime errors:** Faults that halt one program while leaving the rest running.
//! 3. **Infrastructure errors:** Fatal conditions that stop new admissions.

use std::fmt;

use super::Pid;

/// Result alias used by every fallible API in the crate.
pub type SimResult<T> = Result<T, SimError>;

/// Errors produced by the simulator core.
///
/// Submission errors (`NotInitialized`, `InvalidMemorySize`, `InvalidProgram`)
/// are returned synchronously and mutate no state. Runtime errors
/// (`InvalidAddress`, `ArithError`, `AccessViolation`) halt the offending
/// program only. `ConfigIo` and `BackingStore` are infrastructure failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// A process was submitted before the scheduler was started.
    NotInitialized,

    /// The requested memory size is outside the configured range or not a
    /// power of two. The associated value is the rejected size in bytes.
    InvalidMemorySize(usize),

    /// The program source failed to parse or had an invalid length.
    /// The associated value names the offending instruction or rule.
    InvalidProgram(String),

    /// A pager access referenced an address outside the process's memory.
    InvalidAddress {
        /// Process whose access was rejected.
        pid: Pid,
        /// The out-of-range virtual address.
        addr: u32,
    },

    /// An arithmetic instruction failed (division by zero).
    ArithError(String),

    /// A program touched an address outside its allocation and was halted.
    AccessViolation {
        /// Process that crashed.
        pid: Pid,
        /// The invalid virtual address.
        addr: u32,
    },

    /// A query referenced a pid the process table has never assigned.
    UnknownPid(Pid),

    /// The configuration file could not be read or parsed.
    ConfigIo(String),

    /// The backing store could not be opened, written, or has overflowed
    /// its configured size.
    BackingStore(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::NotInitialized => write!(f, "scheduler has not been initialized"),
            SimError::InvalidMemorySize(size) => {
                write!(f, "invalid memory size: {} bytes", size)
            }
            SimError::InvalidProgram(msg) => write!(f, "invalid program: {}", msg),
            SimError::InvalidAddress { pid, addr } => {
                write!(f, "process {} accessed invalid address {:#x}", pid, addr)
            }
            SimError::ArithError(msg) => write!(f, "arithmetic error: {}", msg),
            SimError::AccessViolation { pid, addr } => {
                write!(f, "process {} access violation at {:#x}", pid, addr)
            }
            SimError::UnknownPid(pid) => write!(f, "unknown pid {}", pid),
            SimError::ConfigIo(msg) => write!(f, "configuration error: {}", msg),
            SimError::BackingStore(msg) => write!(f, "backing store error: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}
