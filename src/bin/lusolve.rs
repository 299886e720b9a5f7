//! lusolve
//!
//! Records the LU solve of sample linear systems, then evaluates each tape
//! with the sequential and the parallel Jacobian driver and compares them.
//!
//! # Usage
//!
//! ```bash
//! lusolve 1 2 5 10
//! lusolve --threads 4 --seed 7 --doc 3
//! ADTAPE_NUM_THREADS=8 RUST_LOG=debug lusolve 20 40
//! ```

use std::process::ExitCode;

use adtape::lu::{Problem, COMPARE_EPS};
use adtape::{Matrix, ParallelConfig, TapeStore};
use clap::{CommandFactory, Parser};
use log::{error, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Systems smaller than this print their Jacobians.
const PRINT_LIMIT: usize = 6;

/// Linear system solving by LU decomposition, differentiated through a tape.
#[derive(Parser, Debug)]
#[command(name = "lusolve")]
#[command(version)]
struct Cli {
    /// System sizes to trace (each at least 1)
    #[arg(value_parser = parse_size)]
    sizes: Vec<usize>,

    /// Worker threads for the parallel Jacobian [default: $ADTAPE_NUM_THREADS or all cores]
    #[arg(short, long)]
    threads: Option<usize>,

    /// Seed for the shuffled evaluation order
    #[arg(short, long)]
    seed: Option<u64>,

    /// Print the tape listing, with the value of every slot, for every system
    #[arg(long)]
    doc: bool,
}

fn parse_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        Ok(_) => Err("system size must be at least 1".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.sizes.is_empty() {
        // Nothing to do: show usage and exit cleanly.
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let mut sizes = cli.sizes.clone();
    sizes.sort_unstable();
    sizes.dedup();

    let workers = cli
        .threads
        .map_or_else(ParallelConfig::from_env, ParallelConfig::with_workers)
        .num_workers;
    info!("parallel jacobian on {} workers", workers);

    let store = TapeStore::<f64>::new();
    let mut failed = false;

    println!("LINEAR SYSTEM SOLVING by LU-DECOMPOSITION\n");
    banner("Evaluation in sequential order");
    failed |= !run_all(&store, &sizes, workers, cli.doc);

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut shuffled = sizes;
    shuffled.shuffle(&mut rng);
    banner("Evaluation in alternate order");
    failed |= !run_all(&store, &shuffled, workers, cli.doc);

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn banner(title: &str) {
    println!("=========================================================");
    println!(" {}", title);
    println!("=========================================================");
}

/// Trace and evaluate every size in order. False if any size failed.
fn run_all(store: &TapeStore<f64>, sizes: &[usize], workers: usize, doc: bool) -> bool {
    let mut ok = true;
    for &size in sizes {
        println!("=== System size is: {}", size);
        match run_one(store, size, workers, doc) {
            Ok(consistent) => ok &= consistent,
            Err(e) => {
                error!("size {}: {}", size, e);
                ok = false;
            }
        }
        println!();
    }
    ok
}

/// Trace, replay and differentiate one system. `Ok(false)` if the drivers disagree.
fn run_one(store: &TapeStore<f64>, size: usize, workers: usize, doc: bool) -> adtape::Result<bool> {
    let problem = Problem::trace(store, store.mint_id(), size)?;
    println!("  x[0] (original) : {:e}", problem.x[0]);
    let replayed = problem.replay()?;
    println!("  x[0] (from tape): {:e}", replayed[0]);

    let report = problem.apply_drivers(workers)?;
    if size < PRINT_LIMIT {
        print_matrix("Jacobian", &report.jacobian);
        print_matrix("Par Jacobian", &report.par_jacobian);
    }

    println!("\n  Compare results:");
    for m in &report.mismatches {
        println!(
            "\tUnexpected value: expected[{}][{}] = {} vs result[{}][{}] = {}",
            m.row, m.col, m.expected, m.row, m.col, m.actual
        );
    }
    if report.is_consistent() {
        println!(
            "    jac and parJac are identical within eps {:e}.",
            COMPARE_EPS
        );
    }
    println!();

    if doc {
        print!("{}", problem.tape.listing_at(&problem.args)?);
    }

    let stats = problem.tape.stats();
    println!("  Tape Statistics:");
    println!("    independents            {}", stats.independent_count);
    println!("    dependents              {}", stats.dependent_count);
    println!("    operations              {}", stats.op_count);
    println!("    locations               {}", stats.location_count);
    println!("    location references     {}", stats.location_ref_count);
    println!("    constants               {}", stats.constant_count);
    println!("    maxlive                 {}", stats.max_live_locations);
    println!("    op buffer bytes         {}", stats.op_buffer_bytes);
    println!("    value stack bytes       {}", stats.value_stack_bytes);
    println!();

    if !report.is_consistent() {
        error!(
            "trace {}: {} jacobian entries differ",
            problem.id,
            report.mismatches.len()
        );
    }
    Ok(report.is_consistent())
}

fn print_matrix(name: &str, m: &Matrix<f64>) {
    println!("\n Print matrix {} ({}x{}):", name, m.rows(), m.cols());
    print!("{}", m);
    println!();
}
