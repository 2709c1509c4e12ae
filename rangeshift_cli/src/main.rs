// CLI entry point for the rangeshift simulation engine.
//
// Loads a scenario JSON file, applies command-line overrides to its run
// config, runs it, and writes the recorded time series as JSON. The
// `template` subcommand writes the built-in example scenario, which is the
// easiest starting point for a new scenario file.
//
// Usage:
//   rangeshift run <SCENARIO> [OPTIONS]
//     --out <FILE>        Output file (default: stdout)
//     --steps <N>         Override the step count
//     --seed <N>          Override the base seed
//     --record <STAGE>    Override the recorded stage
//     --deterministic     Expected values instead of sampling
//     --parallel          Per-cell parallel sampling
//     --absorbing         Lose dispersers that leave the grid
//   rangeshift template [--out <FILE>]
//
// Logging goes to stderr through `tracing`; set `RUST_LOG=debug` to see
// per-step totals.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rangeshift_sim::{Boundary, Sampling, Scenario};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "rangeshift",
    version,
    about = "Stage-structured population dynamics with kernel dispersal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and write the recorded stage at every step.
    Run {
        /// Scenario JSON file.
        scenario: PathBuf,
        /// Write the time series here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        steps: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Stage to record.
        #[arg(long)]
        record: Option<usize>,
        /// Use expected values instead of random draws.
        #[arg(long, conflicts_with = "parallel")]
        deterministic: bool,
        /// Sample cells in parallel from per-cell substreams.
        #[arg(long)]
        parallel: bool,
        /// Drop dispersers that leave the grid instead of reflecting them.
        #[arg(long)]
        absorbing: bool,
    },
    /// Write the built-in example scenario.
    Template {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    match Cli::parse().command {
        Command::Run {
            scenario,
            out,
            steps,
            seed,
            record,
            deterministic,
            parallel,
            absorbing,
        } => {
            let mut loaded = Scenario::load(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;
            let config = &mut loaded.config;
            if let Some(steps) = steps {
                config.steps = steps;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(stage) = record {
                config.record_stage = stage;
            }
            if deterministic {
                config.sampling = Sampling::Deterministic;
            } else if parallel {
                config.sampling = Sampling::ParallelStochastic;
            }
            if absorbing {
                config.boundary = Boundary::Absorbing;
            }

            let series = loaded.run().context("simulation failed")?;
            let totals = series.totals();
            if let (Some(first), Some(last)) = (totals.first(), totals.last()) {
                info!(stage = series.stage, first, last, "recorded abundance");
            }
            write_json(&series, out.as_deref())
        }
        Command::Template { out } => write_json(&Scenario::default(), out.as_deref()),
    }
}

fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if path.is_dir() {
                bail!("output path {} is a directory", path.display());
            }
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
