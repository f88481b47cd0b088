//! Policy-gradient training loop with active search.
//!
//! One episode = one batch of sampled rollouts. Each episode computes rewards
//! (satisfied clauses), an optional baseline, the entropy-regularised objective,
//! and accumulates gradients; every `accumulation_episodes` episodes Adam takes
//! a step. Evaluation cycles run greedy and best-of-k rollouts on the detached
//! policy and keep the best assignment ever seen in an [`ActiveSearchRecord`],
//! persisted to `save_dir/solution.json` after each cycle. Training stops when
//! the sample budget is spent.

use std::collections::BTreeMap;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cnf::{count_satisfied, Formula, PermutationPolicy};
use policy::{FormulaEncoding, PolicyNetwork};
use rollout::{EpisodeRunner, Strategy};

use crate::baseline::Baseline;
use crate::clip::clip_grad_norm;
use crate::config::TrainingConfig;
use crate::error::TrainerError;
use crate::loss::{EntropyEstimator, EpisodeLoss, LossStats};
use crate::metrics::MetricsSink;
use crate::record::{ActiveSearchRecord, SOLUTION_FILE};
use crate::schedule::EntropyWeightDecay;

/// Reason reported when the loop ends.
pub const STOP_CRITERION: &str = "maximum number of samples reached";

/// Result of a finished run.
#[derive(Debug)]
pub struct TrainingOutcome<M> {
    pub model: M,
    pub record: ActiveSearchRecord,
    pub episodes: usize,
    pub samples: usize,
    pub trainable_params: usize,
}

/// Strategy label used in metric names and the record: `greedy` or `sampled-<k>`.
pub fn eval_label(k: usize) -> String {
    if k == 0 {
        "greedy".to_string()
    } else {
        format!("sampled-{k}")
    }
}

/// Key of an evaluation strategy in the per-cycle report.
pub fn report_key(k: usize) -> String {
    if k == 0 {
        "num_sat_greedy".to_string()
    } else {
        format!("num_sat_sample_{k}")
    }
}

/// First row holding the largest count.
fn best_row(counts: &[usize]) -> (usize, usize) {
    let mut best = 0;
    for (row, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = row;
        }
    }
    (best, counts.get(best).copied().unwrap_or(0))
}

/// Mutable run state threaded through every episode and evaluation cycle.
struct TrainingState {
    rng: StdRng,
    order: Box<dyn PermutationPolicy>,
    baseline: Option<Baseline>,
    entropy_decay: Option<EntropyWeightDecay>,
    record: ActiveSearchRecord,
}

impl TrainingState {
    fn new(
        config: &TrainingConfig,
        formula: &Formula,
        trainable_params: usize,
    ) -> Result<Self, TrainerError> {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        // Variable orders get their own stream, derived from the run seed.
        let order_rng = StdRng::seed_from_u64(rng.gen());
        Ok(Self {
            rng,
            order: config.permutation.build_with_rng(formula, order_rng),
            baseline: Baseline::from_config(&config.baseline)?,
            entropy_decay: config
                .entropy_decay
                .map(|d| EntropyWeightDecay::new(d.max, d.min, d.steps)),
            record: ActiveSearchRecord::new(trainable_params),
        })
    }

    fn entropy_weight(&mut self, constant: f64) -> f64 {
        self.entropy_decay
            .as_mut()
            .map_or(constant, EntropyWeightDecay::next_weight)
    }

    /// Run every evaluation strategy once and fold the results into the record.
    #[allow(clippy::too_many_arguments)]
    fn evaluate<B, P>(
        &mut self,
        runner: &EpisodeRunner<'_>,
        formula: &Formula,
        policy: &P,
        device: &B::Device,
        strategies: &[i64],
        episode: usize,
        samples: usize,
        sink: &mut dyn MetricsSink,
    ) -> Result<BTreeMap<String, f64>, TrainerError>
    where
        B: Backend,
        P: PolicyNetwork<B> + ?Sized,
    {
        let mut report = BTreeMap::new();
        for &strat in strategies {
            let k = usize::try_from(strat).map_err(|_| TrainerError::InvalidEvalStrategy(strat))?;
            let (strategy, batch_size) = if k == 0 {
                (Strategy::Greedy, 1)
            } else {
                (Strategy::Sampled, k)
            };
            let buffer = runner.run::<B, P, _>(
                policy,
                device,
                strategy,
                batch_size,
                self.order.as_mut(),
                &mut self.rng,
            )?;
            let counts = count_satisfied(formula, &buffer.actions)?;
            let (row, num_sat) = best_row(&counts);

            let label = eval_label(k);
            sink.scalar(&format!("eval/{label}"), num_sat as f64, samples);
            report.insert(report_key(k), num_sat as f64);
            tracing::info!(episode, samples, strategy = %label, num_sat, "evaluation");

            if self
                .record
                .observe(episode, samples, num_sat, &label, &buffer.actions[row])
            {
                tracing::info!(
                    episode,
                    samples,
                    strategy = %label,
                    num_sat,
                    num_clauses = formula.num_clauses(),
                    "New best assignment"
                );
                if num_sat == formula.num_clauses() {
                    tracing::info!(episode, "Assignment satisfies every clause");
                }
            }
        }
        self.record.close_cycle(episode, samples);
        report.insert("episode".to_string(), episode as f64);
        report.insert("samples".to_string(), samples as f64);
        Ok(report)
    }
}

fn emit_loss_metrics(sink: &mut dyn MetricsSink, stats: &LossStats, samples: usize) {
    sink.scalar("num_sat", stats.num_sat, samples);
    sink.scalar("baseline", stats.baseline, samples);
    sink.scalar("log_prob", stats.log_prob, samples);
    sink.scalar("pg_loss", stats.pg_loss, samples);
    sink.scalar("pg_loss_with_ent", stats.pg_loss_with_ent, samples);
    sink.scalar("entropy/beta", stats.beta, samples);
    sink.scalar("entropy/entropy", stats.entropy, samples);
    sink.scalar("entropy/beta*entropy", stats.beta * stats.entropy, samples);
}

/// Run the policy-gradient loop until the sample budget is spent.
///
/// # Arguments
/// - `config`: validated here; invalid settings fail before any rollout
/// - `formula`: the instance whose satisfied-clause count is the reward
/// - `encoding`: variable features (and context) matching `formula`
/// - `model`: trainable policy, consumed and returned updated
/// - `sink`: receives scalar metrics, evaluation reports and episode progress
///
/// Baseline and evaluation rollouts run on `model.valid()`, so they never
/// contribute gradients.
pub fn train<B, M>(
    config: &TrainingConfig,
    formula: &Formula,
    encoding: &FormulaEncoding,
    mut model: M,
    device: &B::Device,
    sink: &mut dyn MetricsSink,
) -> anyhow::Result<TrainingOutcome<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + PolicyNetwork<B>,
    M::InnerModule: PolicyNetwork<B::InnerBackend>,
{
    config.validate()?;
    anyhow::ensure!(
        encoding.num_variables() == formula.num_variables(),
        "encoding covers {} variables but the formula has {}",
        encoding.num_variables(),
        formula.num_variables()
    );
    encoding.check_compatible::<B, M>(&model)?;

    let estimator: EntropyEstimator = config.entropy_estimator()?;
    let train_runner = EpisodeRunner::new(encoding, config.training_shaping()?);
    let eval_runner = train_runner.with_shaping(config.evaluation_shaping()?);

    std::fs::create_dir_all(&config.save_dir)?;
    let solution_path = config.save_dir.join(SOLUTION_FILE);

    let trainable_params = model.num_params();
    let mut state = TrainingState::new(config, formula, trainable_params)?;

    let mut optimizer = AdamConfig::new().init::<B, M>();
    let mut accumulator = GradientsAccumulator::<M>::new();

    let num_episodes = config.num_episodes();
    tracing::info!(
        num_variables = formula.num_variables(),
        num_clauses = formula.num_clauses(),
        trainable_params,
        num_episodes,
        batch_size = config.batch_size,
        estimator = %estimator,
        baseline = %state.baseline.as_ref().map_or("none".to_string(), Baseline::describe),
        "Starting policy-gradient training"
    );

    let train_start = Instant::now();
    let mut samples = 0;
    for episode in 1..=num_episodes {
        samples = episode * config.batch_size;

        let buffer = train_runner.run::<B, M, _>(
            &model,
            device,
            Strategy::Sampled,
            config.batch_size,
            state.order.as_mut(),
            &mut state.rng,
        )?;
        let rewards = count_satisfied(formula, &buffer.actions)?;

        let baseline = match state.baseline.as_mut() {
            Some(baseline) => {
                let detached = model.valid();
                baseline.estimate::<B::InnerBackend, M::InnerModule, _>(
                    &detached,
                    &eval_runner,
                    formula,
                    device,
                    state.order.as_mut(),
                    &mut state.rng,
                    &rewards,
                )?
            }
            None => 0.0,
        };

        let beta = state.entropy_weight(config.beta_entropy);
        let loss = EpisodeLoss::compute(&buffer, &rewards, baseline, beta, estimator);
        let grads = GradientsParams::from_grads(
            loss.backward_target(config.accumulation_episodes).backward(),
            &model,
        );
        accumulator.accumulate::<B>(&model, grads);

        if episode % config.accumulation_episodes == 0 {
            let mut grads = accumulator.grads();
            if let Some(max_norm) = config.clip_grad {
                let grad_norm = clip_grad_norm::<B, M>(&model, &mut grads, max_norm);
                tracing::debug!(episode, grad_norm, max_norm, "Optimizer step");
            }
            model = optimizer.step(config.lr, model, grads);
        }

        let stats = loss.stats;
        tracing::debug!(
            episode,
            samples,
            num_sat = stats.num_sat,
            baseline = stats.baseline,
            objective = stats.objective,
            "episode"
        );

        if episode % config.log_interval == 0 {
            emit_loss_metrics(sink, &stats, samples);
            tracing::info!(
                episode,
                samples,
                num_sat = stats.num_sat,
                "pg: ({:.3} - {:.3}) * {:.4} + ({} * {:.4}) = {:.4}",
                stats.num_sat,
                stats.baseline,
                stats.log_prob,
                stats.beta,
                stats.entropy,
                stats.objective,
            );
        }

        if episode % config.eval_interval == 0 {
            let detached = model.valid();
            let report = state.evaluate::<B::InnerBackend, M::InnerModule>(
                &eval_runner,
                formula,
                &detached,
                device,
                &config.eval_strategies,
                episode,
                samples,
                sink,
            )?;
            state.record.write_json(&solution_path)?;
            sink.report(&report);
            sink.scalar("active_search", state.record.num_sat as f64, samples);
            tracing::info!(
                episode,
                samples,
                active_search = state.record.num_sat,
                "Evaluation cycle complete"
            );
        }

        sink.on_episode(episode, num_episodes);
    }
    sink.flush();

    if num_episodes % config.accumulation_episodes != 0 {
        tracing::debug!(
            pending = num_episodes % config.accumulation_episodes,
            "Discarding gradients of the incomplete accumulation window"
        );
    }

    let record = state.record;
    tracing::info!(
        episodes = num_episodes,
        samples,
        trainable_params,
        stop_criterion = STOP_CRITERION,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        best_num_sat = record.num_sat,
        best_episode = record.episode,
        best_samples = record.samples,
        best_strategy = record.strategy.as_deref().unwrap_or("none"),
        "Training finished"
    );
    if let Some(sol) = &record.sol {
        tracing::info!(?sol, "Best assignment");
    }

    Ok(TrainingOutcome {
        model,
        record,
        episodes: num_episodes,
        samples,
        trainable_params,
    })
}
