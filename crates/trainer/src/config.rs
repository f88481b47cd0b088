use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cnf::PermutationConfig;
use rollout::LogitShaping;

use crate::error::TrainerError;
use crate::loss::EntropyEstimator;

/// Training configuration loaded from the `[training]` TOML table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Total rollout budget; training runs `ceil(num_samples / batch_size)` episodes.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Sampled rollouts per episode.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Episodes whose gradients are accumulated before each optimizer step.
    #[serde(default = "default_accumulation_episodes")]
    pub accumulation_episodes: usize,

    /// Adam learning rate.
    #[serde(default = "default_lr")]
    pub lr: f64,

    /// Global gradient-norm clip applied at each optimizer step. `None` disables clipping.
    #[serde(default = "default_clip_grad")]
    pub clip_grad: Option<f64>,

    /// `crude` (negative log-prob sum) or `smooth` (analytic entropy).
    #[serde(default = "default_entropy_estimator")]
    pub entropy_estimator: String,

    /// Constant entropy weight, used when `entropy_decay` is not set.
    #[serde(default)]
    pub beta_entropy: f64,

    /// Linearly decaying entropy weight, overriding `beta_entropy`.
    #[serde(default)]
    pub entropy_decay: Option<EntropyDecayConfig>,

    /// `C` in `C * tanh(logits)`; must be >= 1.
    #[serde(default)]
    pub logit_clipping: Option<f64>,

    /// Logit divisor for evaluation and baseline rollouts; must be >= 1.
    #[serde(default)]
    pub logit_temperature: Option<f64>,

    /// Episodes between metric emissions.
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,

    /// Episodes between evaluation cycles.
    #[serde(default = "default_eval_interval")]
    pub eval_interval: usize,

    /// 0 runs one greedy rollout, k >= 1 keeps the best of k sampled rollouts.
    #[serde(default = "default_eval_strategies")]
    pub eval_strategies: Vec<i64>,

    /// Seed for action sampling. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub baseline: BaselineConfig,

    #[serde(default)]
    pub permutation: PermutationConfig,

    /// Directory receiving `solution.json`.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

/// Reference reward subtracted from each rollout's satisfied-clause count.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineConfig {
    #[default]
    None,
    /// Mean reward of fresh rollouts: -1 for one greedy rollout, k >= 1 for k sampled ones.
    Rollout { num_rollouts: i64 },
    /// Best reward among `num_rollouts` sampled rollouts.
    SampleBest { num_rollouts: usize },
    /// Exponential moving average of past batch means.
    Ema { decay: f64 },
}

/// Entropy weight schedule: `max` at the first episode, `min` from episode `steps` on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyDecayConfig {
    pub max: f64,
    pub min: f64,
    pub steps: usize,
}

fn default_num_samples() -> usize {
    15_000
}
fn default_batch_size() -> usize {
    1
}
fn default_accumulation_episodes() -> usize {
    1
}
fn default_lr() -> f64 {
    1.5e-4
}
fn default_clip_grad() -> Option<f64> {
    Some(1.0)
}
fn default_entropy_estimator() -> String {
    "crude".to_string()
}
fn default_log_interval() -> usize {
    100
}
fn default_eval_interval() -> usize {
    100
}
fn default_eval_strategies() -> Vec<i64> {
    vec![0, 10]
}
fn default_save_dir() -> PathBuf {
    PathBuf::from("outputs")
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            batch_size: default_batch_size(),
            accumulation_episodes: default_accumulation_episodes(),
            lr: default_lr(),
            clip_grad: default_clip_grad(),
            entropy_estimator: default_entropy_estimator(),
            beta_entropy: 0.0,
            entropy_decay: None,
            logit_clipping: None,
            logit_temperature: None,
            log_interval: default_log_interval(),
            eval_interval: default_eval_interval(),
            eval_strategies: default_eval_strategies(),
            seed: None,
            baseline: BaselineConfig::default(),
            permutation: PermutationConfig::default(),
            save_dir: default_save_dir(),
        }
    }
}

impl TrainingConfig {
    /// Number of episodes needed to consume the sample budget.
    pub fn num_episodes(&self) -> usize {
        self.num_samples.div_ceil(self.batch_size.max(1))
    }

    /// Parsed entropy estimator.
    pub fn entropy_estimator(&self) -> Result<EntropyEstimator, TrainerError> {
        self.entropy_estimator.parse()
    }

    /// Shaping for training rollouts: clipping only, no temperature.
    pub fn training_shaping(&self) -> Result<LogitShaping, TrainerError> {
        Ok(self.evaluation_shaping()?.without_temperature())
    }

    /// Shaping for evaluation and baseline rollouts.
    pub fn evaluation_shaping(&self) -> Result<LogitShaping, TrainerError> {
        Ok(LogitShaping::new(self.logit_clipping, self.logit_temperature)?)
    }

    /// Reject every invalid setting with a descriptive error.
    pub fn validate(&self) -> Result<(), TrainerError> {
        for (name, value) in [
            ("num_samples", self.num_samples),
            ("batch_size", self.batch_size),
            ("accumulation_episodes", self.accumulation_episodes),
            ("log_interval", self.log_interval),
            ("eval_interval", self.eval_interval),
        ] {
            if value == 0 {
                return Err(TrainerError::ZeroSetting { name });
            }
        }
        positive("lr", self.lr)?;
        if let Some(clip) = self.clip_grad {
            positive("clip_grad", clip)?;
        }
        self.entropy_estimator()?;
        self.evaluation_shaping()?;

        if let Some(&bad) = self.eval_strategies.iter().find(|&&s| s < 0) {
            return Err(TrainerError::InvalidEvalStrategy(bad));
        }
        if let Some(decay) = &self.entropy_decay {
            if decay.steps < 2 {
                return Err(TrainerError::InvalidDecaySteps(decay.steps));
            }
            if decay.min > decay.max {
                return Err(TrainerError::InvalidDecayBounds {
                    max: decay.max,
                    min: decay.min,
                });
            }
        }
        match self.baseline {
            BaselineConfig::Rollout { num_rollouts } if num_rollouts < -1 || num_rollouts == 0 => {
                return Err(TrainerError::InvalidRolloutCount(num_rollouts))
            }
            BaselineConfig::SampleBest { num_rollouts: 0 } => {
                return Err(TrainerError::EmptySampleBest)
            }
            BaselineConfig::Ema { decay } if !(0.0..1.0).contains(&decay) => {
                return Err(TrainerError::InvalidEmaDecay(decay))
            }
            _ => {}
        }
        if self.num_samples % self.batch_size != 0 {
            tracing::warn!(
                num_samples = self.num_samples,
                batch_size = self.batch_size,
                "num_samples is not a multiple of batch_size; the last episode overshoots the budget"
            );
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), TrainerError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TrainerError::NonPositive { name, value })
    }
}
