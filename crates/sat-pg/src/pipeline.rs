//! Training and solution-check pipelines.

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::config::Config;
use serde::Serialize;

use cnf::{evaluate, Formula};
use policy::{FormulaEncoding, LiteralEmbeddings, SatPolicyConfig};
use trainer::{train, ActiveSearchRecord, FanoutSink, JsonlSink, TracingSink, SOLUTION_FILE};

use crate::config::{apply_overrides, load_run_toml, EncodingToml, Overrides, RunToml};
use crate::progress::ProgressSink;

type TrainBackend = Autodiff<NdArray<f32>>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// DIMACS CNF file.
    pub formula: PathBuf,
    /// Run config TOML; defaults apply when absent.
    pub config: Option<PathBuf>,
    /// Literal embeddings JSON, overriding `[encoding].embeddings`.
    pub embeddings: Option<PathBuf>,
    pub num_samples: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
    /// Parent directory of the run directory.
    pub output_dir: PathBuf,
    /// Run directory prefix; defaults to the formula file stem.
    pub run_name: Option<String>,
}

/// Arguments for the `check` subcommand.
#[derive(Debug)]
pub struct CheckArgs {
    pub formula: PathBuf,
    /// `solution.json` file, or a run directory containing one.
    pub solution: PathBuf,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

/// Everything needed to reproduce a run, written as `config.json`.
#[derive(Debug, Serialize)]
struct ResolvedRun<'a> {
    formula: &'a Path,
    num_variables: usize,
    num_clauses: usize,
    #[serde(flatten)]
    run: &'a RunToml,
}

fn build_encoding(
    encoding: &EncodingToml,
    num_variables: usize,
) -> anyhow::Result<FormulaEncoding> {
    match &encoding.embeddings {
        Some(path) => {
            let embeddings = LiteralEmbeddings::from_json(path)?;
            Ok(FormulaEncoding::from_literal_embeddings(
                &embeddings,
                num_variables,
                encoding.context,
            )?)
        }
        None if encoding.context => anyhow::bail!(
            "encoding.context = true requires literal embeddings (set encoding.embeddings or pass --embeddings)"
        ),
        None => Ok(FormulaEncoding::basic(num_variables)),
    }
}

fn run_directory(
    output_dir: &Path,
    run_name: Option<String>,
    formula: &Path,
) -> anyhow::Result<PathBuf> {
    let name = run_name.unwrap_or_else(|| {
        formula
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string())
    });
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    Ok(output_dir.join(format!("{name}-{stamp}")))
}

/// Train a policy on one formula and write the run directory.
///
/// Returns the run directory.
pub fn run_train(args: TrainArgs) -> anyhow::Result<PathBuf> {
    let start = Instant::now();

    // 1. Load formula
    let formula = Formula::from_dimacs_file(&args.formula)?;

    // 2. Load config and merge CLI overrides
    let mut run = match &args.config {
        Some(path) => load_run_toml(path)?,
        None => RunToml::default(),
    };
    apply_overrides(
        &mut run,
        Overrides {
            num_samples: args.num_samples,
            batch_size: args.batch_size,
            seed: args.seed,
            embeddings: args.embeddings,
        },
    );

    // 3. Features and model config
    let encoding = build_encoding(&run.encoding, formula.num_variables())?;
    let policy_config: SatPolicyConfig = run
        .policy
        .to_config(encoding.variable_dim(), encoding.context_dim());
    policy_config.validate()?;

    // 4. Run directory
    let run_dir = run_directory(&args.output_dir, args.run_name, &args.formula)?;
    std::fs::create_dir_all(&run_dir)?;
    run.training.save_dir = run_dir.clone();
    run.training.validate()?;

    serde_json::to_writer_pretty(
        std::fs::File::create(run_dir.join("config.json"))?,
        &ResolvedRun {
            formula: &args.formula,
            num_variables: formula.num_variables(),
            num_clauses: formula.num_clauses(),
            run: &run,
        },
    )?;
    tracing::info!(run_dir = %run_dir.display(), "Created run directory");

    // 5. Model
    let device = Default::default();
    let model = policy_config.init::<TrainBackend>(&device)?;
    tracing::info!(decoder = model.decoder_kind(), "Initialized policy");

    // 6. Train
    let mut sink = FanoutSink::new()
        .with(TracingSink)
        .with(JsonlSink::create(&run_dir.join("metrics.jsonl"))?)
        .with(ProgressSink::new(run.training.num_episodes()));
    let outcome = train::<TrainBackend, _>(
        &run.training,
        &formula,
        &encoding,
        model,
        &device,
        &mut sink,
    )?;

    // 7. Final checkpoint
    outcome.model.save_checkpoint(&run_dir.join("model"))?;
    policy_config
        .save(run_dir.join("policy.json"))
        .map_err(|e| anyhow::anyhow!("Failed to save policy config: {e}"))?;

    // 8. Summary
    let record = &outcome.record;
    println!("\n--- Training Summary ---");
    println!("Episodes: {}", outcome.episodes);
    println!("Samples: {}", outcome.samples);
    println!("Trainable params: {}", outcome.trainable_params);
    println!("Best: {}/{} clauses", record.num_sat, formula.num_clauses());
    println!(
        "Found at: episode {}, {} samples ({})",
        record.episode,
        record.samples,
        record.strategy.as_deref().unwrap_or("none")
    );
    println!("Output: {}", run_dir.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(run_dir)
}

/// Result of re-evaluating a stored assignment.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub num_satisfied: usize,
    pub num_clauses: usize,
    pub is_satisfied: bool,
    pub recorded_num_sat: usize,
    /// 1-based indices of the unsatisfied clauses.
    pub unsatisfied: Vec<usize>,
}

/// Re-evaluate the assignment stored in a `solution.json`.
pub fn check_solution(formula_path: &Path, solution: &Path) -> anyhow::Result<CheckReport> {
    let formula = Formula::from_dimacs_file(formula_path)?;
    let path = if solution.is_dir() {
        solution.join(SOLUTION_FILE)
    } else {
        solution.to_path_buf()
    };
    let record = ActiveSearchRecord::read_json(&path)?;
    let sol = record
        .sol
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("{} holds no assignment yet", path.display()))?;
    let eval = evaluate(&formula, sol)?;
    if eval.num_satisfied != record.num_sat {
        tracing::warn!(
            recorded = record.num_sat,
            actual = eval.num_satisfied,
            "Recorded count differs from re-evaluation; was the solution produced for another formula?"
        );
    }
    Ok(CheckReport {
        num_satisfied: eval.num_satisfied,
        num_clauses: formula.num_clauses(),
        is_satisfied: eval.is_satisfied,
        recorded_num_sat: record.num_sat,
        unsatisfied: eval
            .clause_satisfied
            .iter()
            .enumerate()
            .filter(|(_, &sat)| !sat)
            .map(|(i, _)| i + 1)
            .collect(),
    })
}

/// Print the result of [`check_solution`].
pub fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    let report = check_solution(&args.formula, &args.solution)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("--- Solution Check ---");
    println!("Formula: {}", args.formula.display());
    println!("Satisfied: {}/{}", report.num_satisfied, report.num_clauses);
    println!("Recorded: {}", report.recorded_num_sat);
    if report.is_satisfied {
        println!("All clauses satisfied");
    } else {
        println!("Unsatisfied clauses: {:?}", report.unsatisfied);
    }
    Ok(())
}
