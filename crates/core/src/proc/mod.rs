//! Process records and program parsing.
//!
//! This module provides:
//! 1. **Programs:** The instruction set and the semicolon-separated source parser.
//! 2. **Sessions:** The runtime record of one submitted process.
//! 3. **Process table:** The mutex-guarded pid → session map with monotone id assignment.

/// Instruction set and program source parser.
pub mod program;

/// Session records and the process table.
pub mod session;

pub use program::{parse_program, Instruction};
pub use session::{CrashInfo, ProcessTable, Session, SessionView};
