//! Policy-gradient objective and entropy estimators.
//!
//! Per rollout the objective is `(r - b) * l + beta * H`, where `r` is the
//! satisfied-clause count, `b` the baseline, `l` the summed log-probability of
//! the chosen actions and `H` the entropy estimate. Training maximises its
//! batch mean, so the tensor handed to `backward()` is its negation.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;

use policy::bridge::{tensor_to_f64, tensor_to_vec, values_to_tensor};
use rollout::TrajectoryBuffer;

use crate::error::TrainerError;

/// Floor applied to probabilities before taking their log.
const PROB_FLOOR: f64 = 1e-12;

/// How the entropy of a realized trajectory is approximated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyEstimator {
    /// Negative sum of realized log-probabilities (single-sample estimate).
    Crude,
    /// Exact entropy of each step's distribution, summed over steps.
    Smooth,
}

impl FromStr for EntropyEstimator {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crude" => Ok(Self::Crude),
            "smooth" => Ok(Self::Smooth),
            other => Err(TrainerError::InvalidEntropyEstimator(other.to_string())),
        }
    }
}

impl fmt::Display for EntropyEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crude => write!(f, "crude"),
            Self::Smooth => write!(f, "smooth"),
        }
    }
}

impl EntropyEstimator {
    /// Per-rollout entropy estimate, shape `(batch,)`.
    pub fn entropy<B: Backend>(&self, buffer: &TrajectoryBuffer<B>) -> Tensor<B, 1> {
        match self {
            Self::Crude => buffer.log_prob_sum().neg(),
            Self::Smooth => {
                let batch = buffer.batch_size();
                let probs = buffer.two_outcome_probs();
                let log_probs = probs.clone().clamp_min(PROB_FLOOR).log();
                (probs * log_probs)
                    .sum_dim(2)
                    .sum_dim(1)
                    .reshape([batch])
                    .neg()
            }
        }
    }
}

/// Host-side summary of one episode's loss terms, all batch means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossStats {
    pub num_sat: f64,
    pub baseline: f64,
    pub log_prob: f64,
    pub entropy: f64,
    pub beta: f64,
    /// `(mean r - b) * mean l`.
    pub pg_loss: f64,
    /// `pg_loss + beta * mean H`.
    pub pg_loss_with_ent: f64,
    /// `mean((r - b) * l + beta * H)`, the value being maximised.
    pub objective: f64,
}

/// Objective tensor on the autodiff graph plus its host-side summary.
#[derive(Debug)]
pub struct EpisodeLoss<B: Backend> {
    /// `mean((r - b) * l + beta * H)`, shape `(1,)`.
    pub objective: Tensor<B, 1>,
    pub stats: LossStats,
}

impl<B: Backend> EpisodeLoss<B> {
    /// Build the objective for one episode.
    ///
    /// # Panics
    /// Panics if `rewards` does not hold one count per rollout.
    pub fn compute(
        buffer: &TrajectoryBuffer<B>,
        rewards: &[usize],
        baseline: f64,
        beta: f64,
        estimator: EntropyEstimator,
    ) -> Self {
        assert_eq!(rewards.len(), buffer.batch_size(), "one reward per rollout");
        let device = buffer.action_log_prob.device();

        let log_prob = buffer.log_prob_sum();
        let entropy = estimator.entropy(buffer);
        let advantages: Vec<f32> = rewards
            .iter()
            .map(|&r| (r as f64 - baseline) as f32)
            .collect();
        let advantages = values_to_tensor::<B>(&advantages, &device);

        let objective = (log_prob.clone() * advantages + entropy.clone() * beta).mean();

        let num_sat = rewards.iter().sum::<usize>() as f64 / rewards.len() as f64;
        let log_prob = mean(&tensor_to_vec(log_prob));
        let entropy = mean(&tensor_to_vec(entropy));
        let pg_loss = (num_sat - baseline) * log_prob;
        let stats = LossStats {
            num_sat,
            baseline,
            log_prob,
            entropy,
            beta,
            pg_loss,
            pg_loss_with_ent: pg_loss + beta * entropy,
            objective: tensor_to_f64(objective.clone()),
        };
        Self { objective, stats }
    }

    /// Tensor to differentiate: the negated objective scaled for accumulation.
    pub fn backward_target(&self, accumulation_episodes: usize) -> Tensor<B, 1> {
        self.objective
            .clone()
            .neg()
            .div_scalar(accumulation_episodes as f64)
    }
}

fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}
