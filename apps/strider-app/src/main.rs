//! Strider gait transcription benchmark CLI.
//!
//! Provides two modes of operation:
//! - `run`: benchmark transcription schemes on a synthetic gait trial
//! - `config`: print the default benchmark configuration as TOML

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use strider_core::{BenchmarkConfig, StriderError};
use strider_data::SyntheticGaitConfig;
use strider_model::GaitModelFactory;
use strider_ocp::{BenchmarkResults, SolveOutcome, run_pipeline};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Multi-phase gait reconstruction transcription benchmark.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve every configured scheme on a synthetic trial and print a comparison table.
    Run {
        /// Benchmark configuration (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the target shooting interval (s).
        #[arg(long)]
        dt: Option<f64>,

        /// Override the solver iteration cap.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Solve schemes concurrently.
        #[arg(short, long)]
        parallel: bool,

        /// Seed of the synthetic trial's measurement noise.
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Generate a noise-free trial.
        #[arg(long)]
        clean: bool,
    },

    /// Print the default configuration.
    Config,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

struct RunArgs {
    config: Option<PathBuf>,
    dt: Option<f64>,
    max_iterations: Option<u32>,
    parallel: bool,
    seed: u64,
    clean: bool,
}

fn run_benchmark(args: RunArgs) -> Result<(), StriderError> {
    let mut config = match &args.config {
        Some(path) => BenchmarkConfig::from_file(path)?,
        None => BenchmarkConfig::default(),
    };
    if let Some(dt) = args.dt {
        config.target_dt = dt;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.solver.max_iterations = max_iterations;
    }
    config.parallel |= args.parallel;
    info!(
        target_dt = config.target_dt,
        schemes = config.schemes.len(),
        parallel = config.parallel,
        "starting benchmark"
    );

    let mut trial = SyntheticGaitConfig {
        seed: args.seed,
        detection: config.events,
        ..SyntheticGaitConfig::default()
    };
    if args.clean {
        trial.marker_noise_std = 0.0;
        trial.force_noise_std = 0.0;
    }
    let dataset = trial.generate()?;
    let events = dataset.events();
    println!(
        "gait events: heel strike {:.3} s, flat foot {:.3} s, forefoot {:.3} s, toe-off {:.3} s, end {:.3} s",
        events.heel_strike, events.flat_foot, events.forefoot, events.toe_off, events.cycle_end
    );

    let factory = GaitModelFactory::new(trial.leg.clone());
    let results = run_pipeline(&dataset, &config, &factory)?;
    print_table(&results);
    Ok(())
}

fn print_table(results: &BenchmarkResults) {
    println!();
    println!(
        "{:<26} {:>4} {:>4} {:>6} {:>7} {:>7} {:>6} {:>12} {:>9} {:>12} {:>12}  outcome",
        "scheme",
        "nx",
        "nu",
        "nodes",
        "vars",
        "cons",
        "iter",
        "cost",
        "time (s)",
        "shoot (m)",
        "shoot (deg)"
    );
    for record in results {
        let cost = record.cost.map_or_else(|| "-".to_string(), |c| format!("{c:.5e}"));
        let (translation, rotation) = record.single_shooting.map_or_else(
            || ("-".to_string(), "-".to_string()),
            |e| (format!("{:.4e}", e.translation), format!("{:.4e}", e.rotation_deg)),
        );
        let outcome = match &record.outcome {
            SolveOutcome::Converged => "converged".to_string(),
            SolveOutcome::NotConverged => "not converged".to_string(),
            SolveOutcome::Failed { reason } => format!("failed: {reason}"),
        };
        println!(
            "{:<26} {:>4} {:>4} {:>6} {:>7} {:>7} {:>6} {:>12} {:>9.3} {:>12} {:>12}  {}",
            record.scheme,
            record.nx,
            record.nu,
            record.n_shooting,
            record.n_variables,
            record.n_constraints,
            record.iterations,
            cost,
            record.convergence_time.as_secs_f64(),
            translation,
            rotation,
            outcome,
        );
    }
}

fn print_default_config() -> Result<(), String> {
    let text = toml::to_string_pretty(&BenchmarkConfig::default()).map_err(|e| e.to_string())?;
    print!("{text}");
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strider=info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Run {
            config,
            dt,
            max_iterations,
            parallel,
            seed,
            clean,
        }) => run_benchmark(RunArgs {
            config,
            dt,
            max_iterations,
            parallel,
            seed,
            clean,
        })
        .map_err(|e| e.to_string()),
        Some(Commands::Config) => print_default_config(),
        None => run_benchmark(RunArgs {
            config: None,
            dt: None,
            max_iterations: None,
            parallel: false,
            seed: 42,
            clean: false,
        })
        .map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
