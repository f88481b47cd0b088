mod config;
mod pipeline;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{CheckArgs, TrainArgs};

/// sat-pg: MaxSAT by policy-gradient training of an assignment policy.
#[derive(Parser)]
#[command(name = "sat-pg", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training and solution checking.
#[derive(Subcommand)]
enum Command {
    /// Train a policy on one DIMACS formula with active search.
    Train {
        /// Path to the DIMACS CNF file.
        #[arg(long)]
        formula: PathBuf,
        /// Path to a run config TOML file (e.g. configs/train.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Literal embeddings JSON used as variable features.
        #[arg(long)]
        embeddings: Option<PathBuf>,
        /// Override the total sample budget.
        #[arg(long)]
        num_samples: Option<usize>,
        /// Override the number of rollouts per episode.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the RNG seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Directory under which the run directory is created.
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,
        /// Run directory prefix. Default: formula file stem.
        #[arg(long)]
        run_name: Option<String>,
    },
    /// Re-evaluate a saved solution against a formula.
    Check {
        /// Path to the DIMACS CNF file.
        #[arg(long)]
        formula: PathBuf,
        /// Path to solution.json, or the run directory containing it.
        #[arg(long)]
        solution: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            formula,
            config,
            embeddings,
            num_samples,
            batch_size,
            seed,
            output_dir,
            run_name,
        } => pipeline::run_train(TrainArgs {
            formula,
            config,
            embeddings,
            num_samples,
            batch_size,
            seed,
            output_dir,
            run_name,
        })
        .map(|_| ()),
        Command::Check {
            formula,
            solution,
            json,
        } => pipeline::run_check(CheckArgs {
            formula,
            solution,
            json,
        }),
    }
}
