//! Policy-gradient training of assignment policies with active search.
//!
//! # Key types
//!
//! - [`TrainingConfig`]: every hyperparameter of a run, loaded from TOML
//! - [`train`]: the episode loop (rollouts, baseline, objective, Adam, evaluation)
//! - [`Baseline`]: rollout, sample-best and EMA reference rewards
//! - [`EpisodeLoss`] / [`EntropyEstimator`]: the regularised objective
//! - [`ActiveSearchRecord`]: best assignment seen, persisted as `solution.json`
//! - [`MetricsSink`]: where scalar series and evaluation reports go

pub mod baseline;
pub mod clip;
pub mod config;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod record;
pub mod schedule;
pub mod trainer;

pub use baseline::Baseline;
pub use clip::{clip_grad_norm, global_grad_norm};
pub use config::{BaselineConfig, EntropyDecayConfig, TrainingConfig};
pub use error::TrainerError;
pub use loss::{EntropyEstimator, EpisodeLoss, LossStats};
pub use metrics::{FanoutSink, JsonlSink, MetricsSink, RecordingSink, TracingSink};
pub use record::{ActiveSearchRecord, SOLUTION_FILE};
pub use schedule::EntropyWeightDecay;
pub use trainer::{eval_label, report_key, train, TrainingOutcome, STOP_CRITERION};
