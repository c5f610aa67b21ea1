// PHASEPREDICT v1.2.0 -- ONLINE PHASE-CLUSTER PREDICTION
// OPERATOR CLI OVER THE LIBRARY: ENVIRONMENT CHECK, MODEL INSPECTION, LIVE PROBE
//
// THE HOST-FACING SURFACE IS THE C ABI IN THE LIBRARY (predict_cluster).
// THIS BINARY EXERCISES THE SAME PREDICTOR WITHOUT A HOST PROGRAM.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use phasepredict::PredictorConfig;

#[derive(Parser)]
#[command(name = "phasepredict")]
#[command(version)]
#[command(about = "PHASEPREDICT -- ONLINE PHASE-CLUSTER PREDICTION FROM HARDWARE COUNTERS")]
struct Cli {
    // DEBUG-LEVEL LOGGING (PHASEPREDICT_LOG STILL WINS)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify perf availability, the counter set, and the model file
    Check {
        // OVERRIDES SCOREP_RRL_TMM_PATH
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Print every cluster in the model and the training horizon
    Model {
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Drive the predictor over a synthetic workload, one phase per iteration
    Probe {
        #[arg(long)]
        model: Option<PathBuf>,

        // STOP AFTER N PHASES (0 = UNTIL CTRL+C)
        #[arg(long, default_value_t = 0)]
        phases: u32,

        // WORK ITERATIONS PER PHASE
        #[arg(long, default_value_t = 2_000_000)]
        work: u64,

        // DUMP FULL PHASE LOG ON EXIT
        #[arg(long)]
        dump_log: bool,
    },
}

// ENVIRONMENT FIRST, THEN THE COMMAND-LINE OVERRIDE
fn config_with(model: Option<PathBuf>) -> PredictorConfig {
    let mut config = PredictorConfig::from_env();
    if let Some(path) = model {
        config.model_path = Some(path);
    }
    config
}

fn main() -> Result<()> {
    let args = Cli::parse();

    phasepredict::init_logging(if args.verbose { "debug" } else { "info" });

    match args.command {
        Command::Check { model } => cli::check::run_check(&config_with(model)),
        Command::Model { model } => cli::model::run_model(&config_with(model)),
        Command::Probe {
            model,
            phases,
            work,
            dump_log,
        } => cli::probe::run_probe(config_with(model), phases, work, dump_log),
    }
}
