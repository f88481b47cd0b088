//! CNF formulas and the pieces of a rollout that do not touch tensors.
//!
//! Loads DIMACS files into a validated [`Formula`], counts satisfied clauses
//! for 0/1 assignments, and generates the variable orders a rollout follows.
//!
//! # Key types
//!
//! - [`Formula`]: immutable clause list with validated literals
//! - [`evaluate`] / [`count_satisfied`]: single and batched clause evaluation
//! - [`PermutationPolicy`]: random, importance and identity orderings

pub mod dimacs;
pub mod evaluator;
pub mod formula;
pub mod permutation;

pub use dimacs::parse_dimacs;
pub use evaluator::{count_satisfied, evaluate, ClauseEvaluation};
pub use formula::{Formula, FormulaError};
pub use permutation::{
    inverse, FixedPermutation, PermutationConfig, PermutationPolicy, RandomPermutation,
};
