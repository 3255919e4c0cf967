//! # End-to-End Scenarios
//!
//! The six literal system scenarios: fixed-core dispatch, round-robin
//! quantum progress, page faulting under frame pressure, access violations,
//! the symbol-table cap, and crash isolation between processes.

use std::time::Duration;

use csopesy_core::config::SchedulerKind;
use csopesy_core::Config;

use crate::common::harness::{test_config, TestContext};

/// Scenario 1: four synthetic processes under fixed-core dispatch land on
/// core (pid - 1) mod 4, all finish, and no frames stay in use.
#[test]
fn fixed_core_dispatch() {
    let config = Config {
        num_cpu: 4,
        scheduler: SchedulerKind::Fcfs,
        prints_per_process: 1,
        ..test_config()
    };
    let ctx = TestContext::new(config);

    for n in 1..=4 {
        ctx.sim
            .submit_synthetic(&format!("screen_{:02}", n), 4096)
            .unwrap();
    }
    assert!(ctx.wait());

    for view in ctx.sim.processes() {
        assert!(view.finished);
        assert_eq!(view.assigned_core, Some((view.pid as usize - 1) % 4));
    }
    assert_eq!(ctx.wait_frames_released().frames_used, 0);
}

/// Scenario 2: one short program under round-robin finishes within three
/// quanta, prints `2`, and accrues at least one active tick.
#[test]
fn rr_quantum_progress() {
    let config = Config {
        num_cpu: 2,
        scheduler: SchedulerKind::Rr,
        quantum_cycles: 100,
        ..test_config()
    };
    let ctx = TestContext::new(config);

    let pid = ctx
        .sim
        .submit("quick", 4096, "DECLARE a 1; ADD a a 1; PRINT(a)")
        .unwrap();

    let done = ctx.sim.wait_until_done(Duration::from_millis(3 * 100 + 50));
    assert!(done, "program must complete within three quanta");

    let view = ctx.sim.process(pid).unwrap();
    assert_eq!(view.output, vec!["2".to_string()]);
    assert!(view.active_ticks >= 1);
}

/// Scenario 3: two frames, four pages, a touch pattern that overflows the
/// pool. Every touch of a new page faults; once the pool is full, each
/// further fault evicts the oldest-admitted frame.
#[test]
fn page_fault_under_pressure() {
    let config = Config {
        num_cpu: 1,
        mem_per_frame: 16,
        num_frames: 2,
        ..test_config()
    };
    let ctx = TestContext::new(config);

    let pid = ctx
        .sim
        .submit(
            "presser",
            64,
            "WRITE 0x00 1; WRITE 0x10 2; WRITE 0x20 3; READ x 0x00; PRINT(x)",
        )
        .unwrap();
    assert!(ctx.wait());

    let view = ctx.sim.process(pid).unwrap();
    assert!(view.crash.is_none(), "no address errors expected");
    // x is the pager-synthesized value for address 0x00.
    assert_eq!(view.output, vec!["0".to_string()]);

    let stats = ctx.wait_frames_released();
    // Pages 0, 1, 2 fault on first touch; the READ faults page 0 back in.
    assert_eq!(stats.faults, 4);
    // Page 2's fault evicts page 0 (first admitted); the READ's fault then
    // evicts page 1, the oldest resident at that point.
    assert_eq!(stats.replacements, 2);
    assert_eq!(stats.frames_used, 0);
}

/// Scenario 4: an out-of-range READ halts the process with the invalid
/// address recorded; later instructions never run.
#[test]
fn access_violation_recorded() {
    let ctx = TestContext::new(test_config());

    let pid = ctx
        .sim
        .submit("violator", 64, "READ v 0x1000; DECLARE z 5; PRINT(z)")
        .unwrap();
    assert!(ctx.wait());

    let view = ctx.sim.process(pid).unwrap();
    assert!(view.finished);
    let crash = view.crash.expect("crash record");
    assert_eq!(crash.addr, 0x1000);
    assert_eq!(view.var_count, 0, "DECLARE after the crash must not run");
    assert!(view.output.is_empty());
}

/// Scenario 5: a 33rd distinct DECLARE is ignored; the program continues
/// and the bound-variable count stays at 32.
#[test]
fn symbol_table_full_is_not_fatal() {
    let ctx = TestContext::new(test_config());

    let source = (0..33)
        .map(|n| format!("DECLARE v{} {}", n, n))
        .collect::<Vec<_>>()
        .join("; ")
        + r#"; PRINT("done")"#;
    let pid = ctx.sim.submit("full", 4096, &source).unwrap();
    assert!(ctx.wait());

    let view = ctx.sim.process(pid).unwrap();
    assert!(view.crash.is_none());
    assert_eq!(view.var_count, 32);
    assert_eq!(view.output, vec!["done".to_string()]);
}

/// Scenario 6: under round-robin, one crashing process leaves the other
/// untouched, and every frame is released once both are done.
#[test]
fn crash_isolation() {
    let config = Config {
        num_cpu: 2,
        scheduler: SchedulerKind::Rr,
        ..test_config()
    };
    let ctx = TestContext::new(config);

    let crasher = ctx
        .sim
        .submit("crasher", 4096, "DECLARE a 1; DIV a a 0; PRINT(a)")
        .unwrap();
    let steady = ctx
        .sim
        .submit("steady", 4096, "DECLARE b 3; ADD b b 4; PRINT(b)")
        .unwrap();
    assert!(ctx.wait());

    let crashed = ctx.sim.process(crasher).unwrap();
    assert!(crashed.finished);
    assert!(crashed.crash.is_some());
    assert!(crashed.output.is_empty());

    let survivor = ctx.sim.process(steady).unwrap();
    assert!(survivor.finished);
    assert!(survivor.crash.is_none());
    assert_eq!(survivor.output, vec!["7".to_string()]);

    assert_eq!(ctx.wait_frames_released().frames_used, 0);
}
