//! Configuration system for the OS simulator.
//!
//! This module defines the tuning parameters consumed by every subsystem.
//! It provides:
//! 1. **Defaults:** Baseline constants (core count, quantum, memory geometry).
//! 2. **File loading:** The whitespace-separated `key value` configuration format.
//! 3. **JSON loading:** `serde` deserialization for programmatic construction.
//!
//! Configuration is immutable once the simulator is constructed; every
//! subsystem receives a clone or borrows the simulator's copy.

use std::fs;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::common::error::{SimError, SimResult};

/// Default configuration constants for the simulator.
///
/// These values define the baseline setup when a key is absent from the
/// configuration file or JSON document.
mod defaults {
    /// Number of worker cores.
    pub const NUM_CPU: usize = 4;

    /// Round-robin quantum in milliseconds.
    pub const QUANTUM_CYCLES: u64 = 100;

    /// Batch process generation frequency (reserved).
    pub const BATCH_PROCESS_FREQ: u64 = 1;

    /// Minimum instruction count for generated programs.
    pub const MIN_INS: usize = 1;

    /// Maximum instruction count for generated programs.
    ///
    /// Also the hard upper bound enforced on submitted programs.
    pub const MAX_INS: usize = 50;

    /// Inter-instruction delay in milliseconds; 0 disables the delay.
    pub const DELAYS_PER_EXEC: u64 = 0;

    /// Number of synthetic processes created by a batch run.
    pub const NUM_PROCESSES: usize = 10;

    /// Log lines emitted per synthetic process.
    pub const PRINTS_PER_PROCESS: usize = 100;

    /// Default per-process memory in bytes.
    pub const MEM_PER_PROC: usize = 4096;

    /// Smallest admissible per-process memory in bytes.
    pub const MIN_MEMORY_SIZE: usize = 64;

    /// Largest admissible per-process memory in bytes.
    ///
    /// Also the total physical memory when `num-frames` is derived.
    pub const MAX_MEMORY_SIZE: usize = 65_536;

    /// Physical frame (and virtual page) size in bytes.
    pub const MEM_PER_FRAME: usize = 64;

    /// Number of physical frames in the pool.
    pub const NUM_FRAMES: usize = 1024;

    /// Backing-store capacity in bytes of page payload.
    pub const BACKING_STORE_SIZE: usize = 65_536;
}

/// Scheduling discipline selected at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Preemptive round-robin with a quantum; one global ready queue.
    #[default]
    Rr,
    /// Fixed-core first-come-first-served: core = (pid - 1) mod num_cpu,
    /// no preemption.
    #[serde(alias = "fifo")]
    Fcfs,
}

impl SchedulerKind {
    /// Maps the configuration-file value onto a discipline.
    ///
    /// `"rr"` selects round-robin; any other value selects fixed-core
    /// dispatch, matching the file format's loose contract.
    fn from_key(value: &str) -> Self {
        if value == "rr" {
            SchedulerKind::Rr
        } else {
            SchedulerKind::Fcfs
        }
    }
}

/// Root configuration for the simulator.
///
/// # Examples
///
/// ```
/// use csopesy_core::config::{Config, SchedulerKind};
///
/// let config = Config::default();
/// assert_eq!(config.num_cpu, 4);
/// assert_eq!(config.scheduler, SchedulerKind::Rr);
/// assert_eq!(config.num_frames, 1024);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Number of worker cores (≥ 1).
    #[serde(default = "Config::default_num_cpu")]
    pub num_cpu: usize,

    /// Scheduling discipline.
    #[serde(default)]
    pub scheduler: SchedulerKind,

    /// Round-robin quantum in milliseconds.
    #[serde(default = "Config::default_quantum")]
    pub quantum_cycles: u64,

    /// Batch process generation frequency (reserved).
    #[serde(default = "Config::default_batch_freq")]
    pub batch_process_freq: u64,

    /// Minimum generated-program length.
    #[serde(default = "Config::default_min_ins")]
    pub min_ins: usize,

    /// Maximum program length; submissions above this are rejected.
    #[serde(default = "Config::default_max_ins")]
    pub max_ins: usize,

    /// Inter-instruction interpreter delay in milliseconds.
    #[serde(default = "Config::default_delays")]
    pub delays_per_exec: u64,

    /// Synthetic process count for batch runs.
    #[serde(default = "Config::default_num_processes")]
    pub num_processes: usize,

    /// Log lines per synthetic process.
    #[serde(default = "Config::default_prints")]
    pub prints_per_process: usize,

    /// Default per-process memory in bytes.
    #[serde(default = "Config::default_mem_per_proc")]
    pub mem_per_proc: usize,

    /// Smallest admissible per-process memory in bytes.
    #[serde(default = "Config::default_min_memory")]
    pub min_memory_size: usize,

    /// Largest admissible per-process memory in bytes.
    #[serde(default = "Config::default_max_memory")]
    pub max_memory_size: usize,

    /// Frame (and page) size in bytes.
    #[serde(default = "Config::default_mem_per_frame")]
    pub mem_per_frame: usize,

    /// Physical frame count; re-derived from `max_memory_size / mem_per_frame`
    /// whenever a configuration file is loaded.
    #[serde(default = "Config::default_num_frames")]
    pub num_frames: usize,

    /// Backing-store capacity in bytes of page payload.
    #[serde(default = "Config::default_backing_store")]
    pub backing_store_size: usize,
}

impl Config {
    fn default_num_cpu() -> usize {
        defaults::NUM_CPU
    }
    fn default_quantum() -> u64 {
        defaults::QUANTUM_CYCLES
    }
    fn default_batch_freq() -> u64 {
        defaults::BATCH_PROCESS_FREQ
    }
    fn default_min_ins() -> usize {
        defaults::MIN_INS
    }
    fn default_max_ins() -> usize {
        defaults::MAX_INS
    }
    fn default_delays() -> u64 {
        defaults::DELAYS_PER_EXEC
    }
    fn default_num_processes() -> usize {
        defaults::NUM_PROCESSES
    }
    fn default_prints() -> usize {
        defaults::PRINTS_PER_PROCESS
    }
    fn default_mem_per_proc() -> usize {
        defaults::MEM_PER_PROC
    }
    fn default_min_memory() -> usize {
        defaults::MIN_MEMORY_SIZE
    }
    fn default_max_memory() -> usize {
        defaults::MAX_MEMORY_SIZE
    }
    fn default_mem_per_frame() -> usize {
        defaults::MEM_PER_FRAME
    }
    fn default_num_frames() -> usize {
        defaults::NUM_FRAMES
    }
    fn default_backing_store() -> usize {
        defaults::BACKING_STORE_SIZE
    }

    /// Loads a configuration from a JSON document.
    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|e| SimError::ConfigIo(e.to_string()))
    }

    /// Loads a configuration from a whitespace-separated `key value` file.
    ///
    /// Unknown keys consume their value and are skipped with a warning.
    /// Both `max-overall-mem` and `max-memory-size` assign the maximum
    /// memory size; the last occurrence in the file wins. `num-frames` is
    /// always re-derived as `max_memory_size / mem_per_frame` after parsing.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            SimError::ConfigIo(format!("cannot open '{}': {}", path.as_ref().display(), e))
        })?;
        Self::from_key_values(&text)
    }

    /// Parses the `key value` token stream backing [`Config::from_file`].
    pub fn from_key_values(text: &str) -> SimResult<Self> {
        let mut config = Config::default();
        let mut tokens = text.split_whitespace();

        while let Some(key) = tokens.next() {
            let value = tokens.next().ok_or_else(|| {
                SimError::ConfigIo(format!("key '{}' is missing its value", key))
            })?;

            match key {
                "num-cpu" => config.num_cpu = parse_value(key, value)?,
                "scheduler" => config.scheduler = SchedulerKind::from_key(value),
                "quantum-cycles" => config.quantum_cycles = parse_value(key, value)?,
                "batch-process-freq" => config.batch_process_freq = parse_value(key, value)?,
                "min-ins" => config.min_ins = parse_value(key, value)?,
                "max-ins" => config.max_ins = parse_value(key, value)?,
                "delays-per-exec" => config.delays_per_exec = parse_value(key, value)?,
                "num-processes" => config.num_processes = parse_value(key, value)?,
                "prints-per-process" => config.prints_per_process = parse_value(key, value)?,
                "max-overall-mem" => config.max_memory_size = parse_value(key, value)?,
                "mem-per-frame" => config.mem_per_frame = parse_value(key, value)?,
                "mem-per-proc" => config.mem_per_proc = parse_value(key, value)?,
                "min-memory-size" => config.min_memory_size = parse_value(key, value)?,
                "max-memory-size" => config.max_memory_size = parse_value(key, value)?,
                "num-frames" => config.num_frames = parse_value(key, value)?,
                "backing-store-size" => config.backing_store_size = parse_value(key, value)?,
                _ => warn!("unknown config key '{}', skipping", key),
            }
        }

        if config.mem_per_frame == 0 {
            return Err(SimError::ConfigIo("mem-per-frame must be positive".into()));
        }
        if config.num_cpu == 0 {
            return Err(SimError::ConfigIo("num-cpu must be at least 1".into()));
        }
        config.num_frames = config.max_memory_size / config.mem_per_frame;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_cpu: defaults::NUM_CPU,
            scheduler: SchedulerKind::default(),
            quantum_cycles: defaults::QUANTUM_CYCLES,
            batch_process_freq: defaults::BATCH_PROCESS_FREQ,
            min_ins: defaults::MIN_INS,
            max_ins: defaults::MAX_INS,
            delays_per_exec: defaults::DELAYS_PER_EXEC,
            num_processes: defaults::NUM_PROCESSES,
            prints_per_process: defaults::PRINTS_PER_PROCESS,
            mem_per_proc: defaults::MEM_PER_PROC,
            min_memory_size: defaults::MIN_MEMORY_SIZE,
            max_memory_size: defaults::MAX_MEMORY_SIZE,
            mem_per_frame: defaults::MEM_PER_FRAME,
            num_frames: defaults::NUM_FRAMES,
            backing_store_size: defaults::BACKING_STORE_SIZE,
        }
    }
}

/// Parses one configuration value, naming the key on failure.
fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> SimResult<T> {
    value
        .parse()
        .map_err(|_| SimError::ConfigIo(format!("invalid value '{}' for key '{}'", value, key)))
}
