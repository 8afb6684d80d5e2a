use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand, ValueEnum};
use num_bigint::{BigInt, RandBigInt};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use threebit::error::Result;
use threebit::input::MachineInput;
use threebit::machine::{Machine, Outcome, Registers, Step};
use threebit::search::{self, Progress, SearchConfig, Strategy};

#[derive(Parser)]
#[command(name = "threebit", about = "Three-bit register machine and quine search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program and print its output.
    Run {
        /// Input file with registers and program.
        file: PathBuf,

        /// Override register A.
        #[arg(long, allow_negative_numbers = true)]
        a: Option<BigInt>,

        /// Override register B.
        #[arg(long, allow_negative_numbers = true)]
        b: Option<BigInt>,

        /// Override register C.
        #[arg(long, allow_negative_numbers = true)]
        c: Option<BigInt>,

        /// Log every executed instruction at debug level.
        #[arg(long)]
        trace: bool,
    },

    /// Find the smallest A that makes the program print itself.
    Search {
        /// Input file with registers and program (registers are ignored).
        file: PathBuf,

        /// Search algorithm.
        #[arg(long, value_enum, default_value_t = StrategyArg::Constructive)]
        strategy: StrategyArg,

        /// First candidate for A (lower bound for the constructive search).
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Candidates the brute-force scan may try.
        #[arg(long, default_value_t = 1 << 32)]
        max_attempts: u64,

        /// Candidates per parallel block.
        #[arg(long, default_value_t = 1 << 16)]
        block_size: u64,

        /// Max steps per candidate run.
        #[arg(long, default_value_t = 1 << 20)]
        step_limit: u64,

        /// Run every candidate to completion, however long it takes.
        #[arg(long)]
        unbounded: bool,

        /// Report progress every N candidates.
        #[arg(long, default_value_t = 1 << 22)]
        progress_every: u64,

        /// Worker threads (defaults to one per core).
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Print a disassembly of the program.
    Disasm {
        file: PathBuf,
    },

    /// Measure interpreter throughput on random seeds.
    Bench {
        file: PathBuf,

        /// Random seed for reproducibility.
        #[arg(long)]
        seed: u64,

        /// Number of runs.
        #[arg(long, default_value_t = 100_000)]
        runs: usize,

        /// Max steps per run.
        #[arg(long, default_value_t = 1 << 16)]
        step_limit: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Constructive,
    Brute,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Constructive => Strategy::Constructive,
            StrategyArg::Brute => Strategy::BruteForce,
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Run {
            file,
            a,
            b,
            c,
            trace,
        } => run_program(&file, a, b, c, trace),
        Command::Search {
            file,
            strategy,
            start,
            max_attempts,
            block_size,
            step_limit,
            unbounded,
            progress_every,
            threads,
        } => {
            let config = SearchConfig {
                start,
                max_attempts,
                block_size,
                step_limit: (!unbounded).then_some(step_limit),
                progress_every,
            };
            run_search(&file, strategy.into(), &config, threads)
        }
        Command::Disasm { file } => {
            MachineInput::from_path(&file).map(|input| print!("{}", input.program.disassemble()))
        }
        Command::Bench {
            file,
            seed,
            runs,
            step_limit,
        } => run_benchmark(&file, seed, runs, step_limit),
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run_program(
    file: &Path,
    a: Option<BigInt>,
    b: Option<BigInt>,
    c: Option<BigInt>,
    trace: bool,
) -> Result<()> {
    let input = MachineInput::from_path(file)?;
    let registers = Registers {
        a: a.unwrap_or(input.registers.a),
        b: b.unwrap_or(input.registers.b),
        c: c.unwrap_or(input.registers.c),
    };
    let mut machine = Machine::load(&input.program, registers);

    if trace {
        loop {
            if let Some(instruction) = machine.current() {
                let regs = machine.registers();
                debug!(
                    ip = machine.ip(),
                    a = %regs.a,
                    b = %regs.b,
                    c = %regs.c,
                    "{instruction}"
                );
            }
            if machine.step()? == Step::Halted {
                break;
            }
        }
    } else {
        machine.run()?;
    }

    let regs = machine.registers();
    println!("{}", threebit::program::canonical_text(machine.output()));
    info!(
        a = %regs.a,
        b = %regs.b,
        c = %regs.c,
        steps = machine.steps(),
        "halted"
    );
    Ok(())
}

fn run_search(
    file: &Path,
    strategy: Strategy,
    config: &SearchConfig,
    threads: Option<usize>,
) -> Result<()> {
    if let Some(n) = threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
            warn!("could not size thread pool: {e}");
        }
    }

    let input = MachineInput::from_path(file)?;
    let program = input.program;
    info!(program = %program, ?strategy, "searching for a self-reproducing seed");

    let stop = AtomicBool::new(false);
    let seed = search::search(&program, strategy, config, &stop, |p: &Progress| {
        info!(
            candidates = p.candidates,
            current = %p.current,
            elapsed = ?p.elapsed,
            "still searching"
        );
    })?;

    let output = search::verify_seed(&program, &seed)?;
    info!(output = %output, "round trip confirmed");
    println!("{seed}");
    Ok(())
}

fn run_benchmark(file: &Path, seed: u64, runs: usize, step_limit: u64) -> Result<()> {
    let input = MachineInput::from_path(file)?;
    let program = input.program;
    let mut rng = SmallRng::seed_from_u64(seed);
    // Seeds with as many octal digits as the program has words.
    let bits = 3 * program.len() as u64;

    let mut machine = Machine::load(&program, Registers::default());
    let mut total_steps: u64 = 0;
    let mut halted = 0usize;
    let mut faulted = 0usize;

    let start = std::time::Instant::now();
    for _ in 0..runs {
        let a = rng.gen_biguint(bits);
        machine.reset(Registers::with_a(a));
        match machine.run_for(step_limit) {
            Ok(Outcome::Halted) => halted += 1,
            Ok(Outcome::StepLimit) => {}
            Err(_) => faulted += 1,
        }
        total_steps += machine.steps();
    }
    let elapsed = start.elapsed();

    let runs_per_sec = runs as f64 / elapsed.as_secs_f64();
    let steps_per_sec = total_steps as f64 / elapsed.as_secs_f64();

    eprintln!("Benchmark results:");
    eprintln!("  Runs:              {runs}");
    eprintln!("  Halted:            {halted}");
    eprintln!("  Faulted:           {faulted}");
    eprintln!("  Total steps:       {total_steps}");
    eprintln!("  Elapsed:           {elapsed:.2?}");
    eprintln!("  Runs/sec:          {runs_per_sec:.0}");
    eprintln!("  Steps/sec:         {steps_per_sec:.0}");
    Ok(())
}
