//! # Interpreter Tests
//!
//! Exercises instruction semantics directly against a process table and
//! frame pool, without the scheduler: clamping, variable binding, crash
//! paths, the symbol-table cap, and PRINT rendering.

use std::sync::Arc;

use csopesy_core::common::Pid;
use csopesy_core::interp::Interpreter;
use csopesy_core::mem::layout::ProcessMemoryLayout;
use csopesy_core::mem::pager::FramePool;
use csopesy_core::proc::program::parse_program;
use csopesy_core::proc::session::ProcessTable;

use crate::common::mocks::MemoryStore;

const FRAME_SIZE: usize = 16;

struct Fixture {
    table: Arc<ProcessTable>,
    pool: Arc<FramePool>,
    pid: Pid,
}

impl Fixture {
    fn new(source: &str, memory_size: usize) -> Self {
        let table = Arc::new(ProcessTable::new());
        let store = Arc::new(MemoryStore::new(FRAME_SIZE));
        let pool = Arc::new(FramePool::new(8, FRAME_SIZE, store).unwrap());

        let program = parse_program(source).unwrap();
        let layout = Arc::new(ProcessMemoryLayout::new(memory_size, FRAME_SIZE));
        let pid = table.create("test".into(), memory_size, program, Arc::clone(&layout));
        pool.register(pid, layout);

        Self { table, pool, pid }
    }

    fn run(&self) {
        Interpreter::new(Arc::clone(&self.table), Arc::clone(&self.pool), 0).run(self.pid);
    }

    fn var(&self, name: &str) -> Option<u16> {
        self.table
            .with_session(self.pid, |s| s.var_value(name))
            .unwrap()
    }

    fn output(&self) -> Vec<String> {
        self.table
            .with_session(self.pid, |s| s.output.clone())
            .unwrap()
    }

    fn crashed(&self) -> bool {
        self.table
            .with_session(self.pid, |s| s.crash.is_some())
            .unwrap()
    }
}

#[test]
fn declare_add_print() {
    let fx = Fixture::new("DECLARE a 1; ADD a a 1; PRINT(a)", 64);
    fx.run();

    assert_eq!(fx.var("a"), Some(2));
    assert_eq!(fx.output(), vec!["2".to_string()]);
    assert!(!fx.crashed());
}

#[test]
fn declare_clamps_to_u16_range() {
    let fx = Fixture::new("DECLARE big 70000; DECLARE neg -5", 64);
    fx.run();

    assert_eq!(fx.var("big"), Some(65_535));
    assert_eq!(fx.var("neg"), Some(0));
}

#[test]
fn arithmetic_saturates_at_both_ends() {
    let fx = Fixture::new(
        "DECLARE a 60000; ADD b a 60000; DECLARE c 5; SUB d c 10; MUL e a 2",
        64,
    );
    fx.run();

    assert_eq!(fx.var("b"), Some(65_535));
    assert_eq!(fx.var("d"), Some(0));
    assert_eq!(fx.var("e"), Some(65_535));
}

#[test]
fn operands_resolve_variables_then_literals() {
    let fx = Fixture::new("DECLARE a 10; ADD b a 32; DIV c b 7", 64);
    fx.run();

    assert_eq!(fx.var("b"), Some(42));
    assert_eq!(fx.var("c"), Some(6));
}

#[test]
fn division_by_zero_halts_the_program() {
    let fx = Fixture::new("DECLARE a 1; DIV a a 0; DECLARE after 9; PRINT(after)", 64);
    fx.run();

    assert!(fx.crashed());
    assert_eq!(fx.var("after"), None, "instructions after the crash must not run");
    assert!(fx.output().is_empty());
    let finished = fx.table.with_session(fx.pid, |s| s.finished).unwrap();
    assert!(finished);
}

#[test]
fn read_out_of_bounds_is_an_access_violation() {
    let fx = Fixture::new("READ v 0x1000; DECLARE z 5", 64);
    fx.run();

    let crash = fx.table.with_session(fx.pid, |s| s.crash.clone()).unwrap();
    let crash = crash.expect("crash record");
    assert_eq!(crash.addr, 0x1000);
    assert_eq!(fx.var("v"), None);
    assert_eq!(fx.var("z"), None);
}

#[test]
fn write_out_of_bounds_is_an_access_violation() {
    let fx = Fixture::new("DECLARE a 1; WRITE 0xFFFF a", 64);
    fx.run();

    let crash = fx.table.with_session(fx.pid, |s| s.crash.clone()).unwrap();
    assert_eq!(crash.expect("crash record").addr, 0xFFFF);
}

#[test]
fn write_with_undeclared_variable_crashes() {
    let fx = Fixture::new("WRITE 0x10 ghost", 64);
    fx.run();

    assert!(fx.crashed());
}

#[test]
fn read_synthesizes_a_deterministic_value() {
    // Frames carry bookkeeping only; reads yield addr % 1000.
    let fx = Fixture::new("READ x 0x00; READ y 0x20", 64);
    fx.run();

    assert_eq!(fx.var("x"), Some(0));
    assert_eq!(fx.var("y"), Some(0x20 % 1000));
    assert!(!fx.crashed());
}

#[test]
fn symbol_table_caps_at_thirty_two() {
    let source = (0..33)
        .map(|n| format!("DECLARE v{} {}", n, n))
        .collect::<Vec<_>>()
        .join("; ");
    let fx = Fixture::new(&source, 64);
    fx.run();

    let count = fx.table.with_session(fx.pid, |s| s.vars.len()).unwrap();
    assert_eq!(count, 32);
    assert_eq!(fx.var("v31"), Some(31));
    assert_eq!(fx.var("v32"), None, "the 33rd DECLARE is ignored");
    assert!(!fx.crashed(), "a full symbol table is not fatal");
}

#[test]
fn redeclare_keeps_the_original_slot() {
    let fx = Fixture::new("DECLARE a 1; DECLARE b 2; DECLARE a 9", 64);
    fx.run();

    let (slot_a, slot_b) = fx
        .table
        .with_session(fx.pid, |s| {
            (s.vars.get("a").unwrap().slot, s.vars.get("b").unwrap().slot)
        })
        .unwrap();
    assert_eq!(slot_a, 0);
    assert_eq!(slot_b, 1);
    assert_eq!(fx.var("a"), Some(9));
}

#[test]
fn print_renders_all_forms() {
    let fx = Fixture::new(
        r#"DECLARE n 7; PRINT(n); PRINT("bare literal"); PRINT("n is " + n); PRINT(unquoted text)"#,
        64,
    );
    fx.run();

    assert_eq!(
        fx.output(),
        vec![
            "7".to_string(),
            "bare literal".to_string(),
            "n is 7".to_string(),
            "unquoted text".to_string(),
        ]
    );
}

#[test]
fn memory_instructions_drive_the_pager() {
    let fx = Fixture::new("DECLARE a 1; WRITE 0x30 a; READ b 0x30", 64);
    fx.run();

    let stats = fx.pool.statistics();
    assert!(stats.faults >= 2, "slot write and 0x30 touch different pages");
    assert!(!fx.crashed());
}

#[test]
fn active_ticks_count_executed_instructions() {
    let fx = Fixture::new("DECLARE a 1; ADD a a 1; PRINT(a)", 64);
    fx.run();

    let ticks = fx.table.with_session(fx.pid, |s| s.active_ticks).unwrap();
    assert_eq!(ticks, 3);
}
