//! CSOPESY operating-system simulator library.
//!
//! This crate implements a multi-core OS simulator with the following:
//! 1. **Scheduler:** Per-core ready queues, fixed-core and round-robin dispatch, worker threads.
//! 2. **Memory:** Per-process segments and page tables, a fixed frame pool with FIFO
//!    replacement, and a persistent line-addressed backing store.
//! 3. **Interpreter:** A small register/memory instruction set whose every memory
//!    operation routes through the pager.
//! 4. **Simulation:** Configuration, process table, tick accounting, and reporting.

/// Common types (process ids, errors, wall-clock formatting).
pub mod common;
/// Simulator configuration (defaults, file and JSON loading).
pub mod config;
/// Instruction interpreter (program execution with demand paging).
pub mod interp;
/// Memory subsystem (layout, backing store, frame pool / pager).
pub mod mem;
/// Processes (program parsing, session records, process table).
pub mod proc;
/// Report rendering and persisted artifacts.
pub mod report;
/// Scheduler and worker cores.
pub mod sched;
/// Simulation statistics (tick counters, paging statistics).
pub mod stats;
/// Top-level simulator aggregate; owns every subsystem.
pub mod sim;

/// Root configuration type; use `Config::default()`, `Config::from_file`, or `Config::from_json`.
pub use crate::config::Config;
/// Crate-wide error type.
pub use crate::common::error::{SimError, SimResult};
/// Top-level simulator; construct with `Simulator::new`, then `start()` and `submit()`.
pub use crate::sim::Simulator;
