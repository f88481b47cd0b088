use cnf::FormulaError;
use rollout::RolloutError;

/// Configuration and runtime errors raised by the training loop.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("'{0}' is not a valid entropy estimator, try 'crude' or 'smooth'")]
    InvalidEntropyEstimator(String),
    #[error(
        "{0} is not a valid number of rollouts, try -1 for 'greedy' or 1, 2, 3, ... for 'sampled'"
    )]
    InvalidRolloutCount(i64),
    #[error("sample-best baseline needs at least one rollout")]
    EmptySampleBest,
    #[error("ema decay must lie in [0, 1), got {0}")]
    InvalidEmaDecay(f64),
    #[error(
        "evaluation strategies must be 0 (greedy) or k >= 1 (best of k samples), got {0}"
    )]
    InvalidEvalStrategy(i64),
    #[error("{name} must be >= 1")]
    ZeroSetting { name: &'static str },
    #[error("{name} must be a positive finite number, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("entropy decay needs steps >= 2, got {0}")]
    InvalidDecaySteps(usize),
    #[error("entropy decay min ({min}) must not exceed max ({max})")]
    InvalidDecayBounds { max: f64, min: f64 },
    #[error(transparent)]
    Rollout(#[from] RolloutError),
    #[error(transparent)]
    Formula(#[from] FormulaError),
}
