//! Episode rollouts of an assignment policy over a CNF formula.
//!
//! One episode decides every variable once, in the order given by a
//! [`cnf::PermutationPolicy`], and records logits, probabilities, actions and
//! log-probabilities in a [`TrajectoryBuffer`] indexed by variable id. The
//! runner performs no learning; training, baselines and evaluation all call
//! it with different strategies and batch sizes.

pub mod buffer;
pub mod mocks;
pub mod runner;
pub mod strategy;

pub use buffer::TrajectoryBuffer;
pub use runner::{EpisodeRunner, RolloutError};
pub use strategy::{LogitShaping, Strategy};
