//! Baseline estimators: reference rewards subtracted from realized rewards.
//!
//! Rollout-based baselines run their own episodes on the gradient-detached
//! policy and never touch the training batch.

use burn::prelude::*;
use rand::Rng;

use cnf::{count_satisfied, Formula, PermutationPolicy};
use policy::PolicyNetwork;
use rollout::{EpisodeRunner, Strategy};

use crate::config::BaselineConfig;
use crate::error::TrainerError;

/// A configured baseline, including any running state.
#[derive(Debug, Clone, PartialEq)]
pub enum Baseline {
    /// Mean satisfied count over fresh rollouts.
    Rollout { strategy: Strategy, batch_size: usize },
    /// Best satisfied count over `k` sampled rollouts.
    SampleBest { k: usize },
    /// Moving average of batch-mean rewards.
    Ema { decay: f64, value: Option<f64> },
}

impl Baseline {
    /// Build the baseline for `config`, or `None` when disabled.
    ///
    /// Invalid rollout counts fail here rather than at the first estimate.
    pub fn from_config(config: &BaselineConfig) -> Result<Option<Self>, TrainerError> {
        let baseline = match *config {
            BaselineConfig::None => return Ok(None),
            BaselineConfig::Rollout { num_rollouts: -1 } => Self::Rollout {
                strategy: Strategy::Greedy,
                batch_size: 1,
            },
            BaselineConfig::Rollout { num_rollouts } if num_rollouts >= 1 => Self::Rollout {
                strategy: Strategy::Sampled,
                batch_size: num_rollouts as usize,
            },
            BaselineConfig::Rollout { num_rollouts } => {
                return Err(TrainerError::InvalidRolloutCount(num_rollouts))
            }
            BaselineConfig::SampleBest { num_rollouts: 0 } => {
                return Err(TrainerError::EmptySampleBest)
            }
            BaselineConfig::SampleBest { num_rollouts } => Self::SampleBest { k: num_rollouts },
            BaselineConfig::Ema { decay } if (0.0..1.0).contains(&decay) => {
                Self::Ema { decay, value: None }
            }
            BaselineConfig::Ema { decay } => return Err(TrainerError::InvalidEmaDecay(decay)),
        };
        Ok(Some(baseline))
    }

    /// Reference value for the current episode.
    ///
    /// `rewards` are the satisfied counts of the training batch; only the EMA
    /// baseline reads them, and it returns the average of earlier episodes
    /// (the current batch mean on the first call) before folding them in.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate<B, P, R>(
        &mut self,
        policy: &P,
        runner: &EpisodeRunner<'_>,
        formula: &Formula,
        device: &B::Device,
        order: &mut dyn PermutationPolicy,
        rng: &mut R,
        rewards: &[usize],
    ) -> Result<f64, TrainerError>
    where
        B: Backend,
        P: PolicyNetwork<B> + ?Sized,
        R: Rng + ?Sized,
    {
        match self {
            Self::Rollout {
                strategy,
                batch_size,
            } => {
                let buffer =
                    runner.run::<B, P, R>(policy, device, *strategy, *batch_size, order, rng)?;
                let counts = count_satisfied(formula, &buffer.actions)?;
                Ok(counts.iter().sum::<usize>() as f64 / counts.len() as f64)
            }
            Self::SampleBest { k } => {
                let buffer =
                    runner.run::<B, P, R>(policy, device, Strategy::Sampled, *k, order, rng)?;
                let counts = count_satisfied(formula, &buffer.actions)?;
                Ok(counts.into_iter().max().unwrap_or(0) as f64)
            }
            Self::Ema { decay, value } => {
                let batch_mean = if rewards.is_empty() {
                    0.0
                } else {
                    rewards.iter().sum::<usize>() as f64 / rewards.len() as f64
                };
                let current = value.unwrap_or(batch_mean);
                *value = Some(*decay * current + (1.0 - *decay) * batch_mean);
                Ok(current)
            }
        }
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Rollout {
                strategy,
                batch_size,
            } => format!("rollout({strategy}, {batch_size})"),
            Self::SampleBest { k } => format!("sample_best({k})"),
            Self::Ema { decay, .. } => format!("ema({decay})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use cnf::FixedPermutation;
    use policy::FormulaEncoding;
    use rollout::mocks::{AlternatingPolicy, FixedLogitsPolicy};
    use rollout::LogitShaping;

    type TestBackend = NdArray<f32>;

    fn estimate_with<P: PolicyNetwork<TestBackend>>(
        baseline: &mut Baseline,
        policy: &P,
        formula: &Formula,
        rewards: &[usize],
    ) -> f64 {
        let encoding = FormulaEncoding::basic(formula.num_variables());
        let runner = EpisodeRunner::new(&encoding, LogitShaping::default());
        baseline
            .estimate::<TestBackend, P, _>(
                policy,
                &runner,
                formula,
                &Default::default(),
                &mut FixedPermutation::identity(formula.num_variables()),
                &mut StdRng::seed_from_u64(1),
                rewards,
            )
            .unwrap()
    }

    #[test]
    fn test_from_config() {
        assert_eq!(Baseline::from_config(&BaselineConfig::None).unwrap(), None);
        assert_eq!(
            Baseline::from_config(&BaselineConfig::Rollout { num_rollouts: -1 }).unwrap(),
            Some(Baseline::Rollout {
                strategy: Strategy::Greedy,
                batch_size: 1
            })
        );
        assert_eq!(
            Baseline::from_config(&BaselineConfig::Rollout { num_rollouts: 4 }).unwrap(),
            Some(Baseline::Rollout {
                strategy: Strategy::Sampled,
                batch_size: 4
            })
        );
    }

    #[test]
    fn test_invalid_rollout_count_fails_at_construction() {
        for n in [0, -2, -10] {
            let err = Baseline::from_config(&BaselineConfig::Rollout { num_rollouts: n });
            assert!(matches!(err, Err(TrainerError::InvalidRolloutCount(v)) if v == n));
        }
        assert!(matches!(
            Baseline::from_config(&BaselineConfig::SampleBest { num_rollouts: 0 }),
            Err(TrainerError::EmptySampleBest)
        ));
        assert!(matches!(
            Baseline::from_config(&BaselineConfig::Ema { decay: 1.0 }),
            Err(TrainerError::InvalidEmaDecay(_))
        ));
    }

    #[test]
    fn test_greedy_rollout_baseline() {
        // Alternating policy assigns [1, 0, 1]; clauses 1 and 3 hold.
        let formula = Formula::new(3, vec![vec![1], vec![2], vec![3]]).unwrap();
        let mut baseline = Baseline::Rollout {
            strategy: Strategy::Greedy,
            batch_size: 1,
        };
        let value = estimate_with(&mut baseline, &AlternatingPolicy::new(3), &formula, &[0]);
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_best_takes_maximum() {
        // Near-certain logits: every sample assigns [1, 0].
        let formula = Formula::new(2, vec![vec![1], vec![-2], vec![2]]).unwrap();
        let policy = FixedLogitsPolicy::new(vec![vec![-20.0, 20.0], vec![20.0, -20.0]]);
        let mut baseline = Baseline::SampleBest { k: 5 };
        let value = estimate_with(&mut baseline, &policy, &formula, &[0]);
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_lags_current_batch() {
        let formula = Formula::new(1, vec![vec![1]]).unwrap();
        let policy = FixedLogitsPolicy::new(vec![vec![0.0]]);
        let mut baseline = Baseline::Ema {
            decay: 0.5,
            value: None,
        };
        // First call returns the batch mean itself.
        assert!((estimate_with(&mut baseline, &policy, &formula, &[4, 2]) - 3.0).abs() < 1e-12);
        // Second call returns the average so far, then folds in 5.
        assert!((estimate_with(&mut baseline, &policy, &formula, &[5]) - 3.0).abs() < 1e-12);
        assert!((estimate_with(&mut baseline, &policy, &formula, &[5]) - 4.0).abs() < 1e-12);
    }
}
