//! CSOPESY simulator CLI.
//!
//! This binary is a thin batch driver over `csopesy_core`. It performs:
//! 1. **Batch run:** Submit the configured number of synthetic processes and
//!    report when they finish.
//! 2. **Exec:** Run one named process with an inline program and dump its
//!    page table, segments, and output.
//!
//! All semantics live in the library; the CLI only loads configuration,
//! submits work, and renders reports.

use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

use csopesy_core::report::{render_frame_table, render_page_table, render_segments};
use csopesy_core::{Config, SimError, Simulator};

#[derive(Parser, Debug)]
#[command(
    name = "csopesy",
    author,
    version,
    about = "CSOPESY operating-system simulator",
    long_about = "Run a batch of synthetic processes under the configured scheduler, or \
execute a single inline program under demand paging.\n\nExamples:\n  \
csopesy run -c config.txt\n  \
csopesy exec -n demo -m 4096 -p \"DECLARE a 1; ADD a a 1; PRINT(a)\""
)]
struct Cli {
    /// Configuration file (whitespace-separated `key value` pairs).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit the configured batch of synthetic processes and wait.
    Run {
        /// Override the number of processes to create.
        #[arg(short, long)]
        processes: Option<usize>,

        /// Seconds to wait for completion before giving up.
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Run one process with an inline program, then dump its state.
    Exec {
        /// Process name.
        #[arg(short, long)]
        name: String,

        /// Memory size in bytes (power of two).
        #[arg(short, long)]
        memory: usize,

        /// Semicolon-separated program source.
        #[arg(short, long)]
        program: String,

        /// Seconds to wait for completion before giving up.
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
        None => Config::default(),
    };

    let result = match cli.command {
        Commands::Run { processes, timeout } => cmd_run(config, processes, timeout),
        Commands::Exec {
            name,
            memory,
            program,
            timeout,
        } => cmd_exec(config, &name, memory, &program, timeout),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Batch mode: synthetic processes, one screen file each.
fn cmd_run(config: Config, processes: Option<usize>, timeout: u64) -> Result<(), SimError> {
    let count = processes.unwrap_or(config.num_processes);
    let mem = config.mem_per_proc;

    println!(
        "Scheduler: {:?}  Cores: {}  Quantum: {} ms  Processes: {}",
        config.scheduler, config.num_cpu, config.quantum_cycles, count
    );

    let sim = Simulator::new(config)?;
    sim.start();

    for n in 1..=count {
        sim.submit_synthetic(&format!("screen_{:02}", n), mem)?;
    }

    let done = sim.wait_until_done(Duration::from_secs(timeout));
    sim.shutdown();

    let ticks = sim.tick_totals();
    println!(
        "\n{} of {} processes finished; active ticks {}, idle ticks {}",
        sim.processes().iter().filter(|v| v.finished).count(),
        count,
        ticks.active,
        ticks.idle
    );
    print!("{}", render_frame_table(&sim.frame_table(), sim.paging_stats()));

    sim.write_memory_report()?;
    sim.write_sim_log()?;

    if !done {
        eprintln!("Warning: timed out before all processes finished");
    }
    Ok(())
}

/// Exec mode: one process with an inline program.
fn cmd_exec(
    config: Config,
    name: &str,
    memory: usize,
    program: &str,
    timeout: u64,
) -> Result<(), SimError> {
    let frame_size = config.mem_per_frame;
    let sim = Simulator::new(config)?;
    sim.start();

    let pid = sim.submit(name, memory, program)?;
    let done = sim.wait_until_done(Duration::from_secs(timeout));
    sim.shutdown();

    let view = sim.process(pid)?;
    println!("Process {} ({})", pid, view.name);
    match &view.crash {
        Some(crash) => println!("  crashed at {:#x}: {}", crash.addr, crash.message),
        None if view.finished => println!("  finished normally"),
        None => println!("  still running"),
    }
    for line in &view.output {
        println!("  | {}", line);
    }
    println!();

    print!("{}", render_segments(pid, &view.name, &sim.segments(pid)?));
    println!();
    print!(
        "{}",
        render_page_table(pid, &view.name, &sim.page_table(pid)?, frame_size)
    );
    println!();
    print!("{}", render_frame_table(&sim.frame_table(), sim.paging_stats()));

    if !done {
        eprintln!("Warning: timed out before the process finished");
    }
    Ok(())
}
