//! Variable orderings: the sequence in which a rollout decides variables.
//!
//! Every generator returns one permutation of `0..num_variables` per batch row.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::formula::Formula;

/// Source of per-rollout variable orders.
pub trait PermutationPolicy: Send {
    /// Number of variables each permutation covers.
    fn num_variables(&self) -> usize;

    /// Produce `batch_size` permutations of `0..num_variables`.
    fn next_permutation(&mut self, batch_size: usize) -> Vec<Vec<usize>>;
}

/// Ordering policy selected in the training config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermutationConfig {
    /// Fresh uniform permutation per call.
    Random {
        /// Fixed seed; every call then replays the same draw.
        #[serde(default)]
        seed: Option<u64>,
        /// Whether each batch row gets its own draw.
        #[serde(default = "default_independent_rows")]
        independent_rows: bool,
    },
    /// Most-referenced variables first.
    Importance,
    /// Natural order `0..n`.
    Identity,
}

fn default_independent_rows() -> bool {
    true
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self::Random {
            seed: None,
            independent_rows: true,
        }
    }
}

impl PermutationConfig {
    /// Build the configured generator for `formula`.
    pub fn build(&self, formula: &Formula) -> Box<dyn PermutationPolicy> {
        self.build_with_rng(formula, StdRng::from_entropy())
    }

    /// Like [`build`](Self::build), but an unseeded random order draws from `rng`.
    ///
    /// Lets a seeded training run reproduce its variable orders.
    pub fn build_with_rng(&self, formula: &Formula, rng: StdRng) -> Box<dyn PermutationPolicy> {
        match self {
            Self::Random {
                seed,
                independent_rows,
            } => Box::new(
                RandomPermutation::with_rng(formula.num_variables(), *independent_rows, rng)
                    .with_seed(*seed),
            ),
            Self::Importance => Box::new(FixedPermutation::by_importance(formula)),
            Self::Identity => Box::new(FixedPermutation::identity(formula.num_variables())),
        }
    }
}

/// Uniformly random orders.
///
/// Without a seed each call draws from the generator (entropy-seeded unless
/// built with [`with_rng`](Self::with_rng)). With a
/// seed the generator is re-seeded on every call, so repeated calls return
/// the same batch of permutations.
#[derive(Debug)]
pub struct RandomPermutation {
    num_variables: usize,
    independent_rows: bool,
    seed: Option<u64>,
    rng: StdRng,
}

impl RandomPermutation {
    pub fn new(num_variables: usize, independent_rows: bool, seed: Option<u64>) -> Self {
        Self::with_rng(num_variables, independent_rows, StdRng::from_entropy()).with_seed(seed)
    }

    /// Unseeded generator drawing from `rng`.
    pub fn with_rng(num_variables: usize, independent_rows: bool, rng: StdRng) -> Self {
        Self {
            num_variables,
            independent_rows,
            seed: None,
            rng,
        }
    }

    /// Replay the draw of `seed` on every call; `None` keeps drawing from the generator.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn draw(rng: &mut StdRng, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        order
    }
}

impl PermutationPolicy for RandomPermutation {
    fn num_variables(&self) -> usize {
        self.num_variables
    }

    fn next_permutation(&mut self, batch_size: usize) -> Vec<Vec<usize>> {
        let n = self.num_variables;
        let mut seeded;
        let rng = match self.seed {
            Some(seed) => {
                seeded = StdRng::seed_from_u64(seed);
                &mut seeded
            }
            None => &mut self.rng,
        };

        if self.independent_rows {
            (0..batch_size).map(|_| Self::draw(rng, n)).collect()
        } else {
            let shared = Self::draw(rng, n);
            vec![shared; batch_size]
        }
    }
}

/// A single order computed once and replayed for every row and call.
#[derive(Debug, Clone)]
pub struct FixedPermutation {
    order: Vec<usize>,
}

impl FixedPermutation {
    /// Natural order `0, 1, ..., n-1`.
    pub fn identity(num_variables: usize) -> Self {
        Self {
            order: (0..num_variables).collect(),
        }
    }

    /// Descending literal-incidence count; ties go to the larger variable index.
    pub fn by_importance(formula: &Formula) -> Self {
        let counts = formula.incidence_counts();
        let mut order: Vec<usize> = (0..formula.num_variables()).collect();
        order.sort_by(|&a, &b| (counts[b], b).cmp(&(counts[a], a)));
        tracing::debug!(?order, "Importance variable order");
        Self { order }
    }

    /// The cached order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

impl PermutationPolicy for FixedPermutation {
    fn num_variables(&self) -> usize {
        self.order.len()
    }

    fn next_permutation(&mut self, batch_size: usize) -> Vec<Vec<usize>> {
        vec![self.order.clone(); batch_size]
    }
}

/// Inverse of a permutation: `inverse[v]` is the step at which variable `v` is decided.
pub fn inverse(order: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; order.len()];
    for (step, &var) in order.iter().enumerate() {
        inv[var] = step;
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_permutation(p: &[usize], n: usize) -> bool {
        let mut seen = vec![false; n];
        p.len() == n
            && p.iter().all(|&v| {
                let fresh = v < n && !seen[v];
                if fresh {
                    seen[v] = true;
                }
                fresh
            })
    }

    #[test]
    fn test_random_rows_are_permutations() {
        let mut gen = RandomPermutation::new(12, true, None);
        let batch = gen.next_permutation(5);
        assert_eq!(batch.len(), 5);
        for row in &batch {
            assert!(is_permutation(row, 12), "not a permutation: {row:?}");
        }
    }

    #[test]
    fn test_random_shared_rows() {
        let mut gen = RandomPermutation::new(10, false, None);
        let batch = gen.next_permutation(4);
        assert!(batch.iter().all(|row| row == &batch[0]));
    }

    #[test]
    fn test_seeded_random_reproducible() {
        let mut a = RandomPermutation::new(20, true, Some(7));
        let mut b = RandomPermutation::new(20, true, Some(7));
        let first = a.next_permutation(3);
        assert_eq!(first, a.next_permutation(3));
        assert_eq!(first, b.next_permutation(3));
    }

    #[test]
    fn test_generator_from_rng_reproducible() {
        let mut a = RandomPermutation::with_rng(16, true, StdRng::seed_from_u64(5));
        let mut b = RandomPermutation::with_rng(16, true, StdRng::seed_from_u64(5));
        let first = a.next_permutation(2);
        assert_eq!(first, b.next_permutation(2));
        // Still a fresh draw per call.
        assert_eq!(a.next_permutation(2), b.next_permutation(2));
        assert_ne!(first, a.next_permutation(2));
    }

    #[test]
    fn test_config_seed_wins_over_rng() {
        let f = Formula::new(12, vec![vec![1]]).unwrap();
        let cfg = PermutationConfig::Random {
            seed: Some(9),
            independent_rows: true,
        };
        let mut a = cfg.build_with_rng(&f, StdRng::seed_from_u64(1));
        let mut b = cfg.build_with_rng(&f, StdRng::seed_from_u64(2));
        assert_eq!(a.next_permutation(3), b.next_permutation(3));
    }

    #[test]
    fn test_unseeded_random_differs() {
        let mut gen = RandomPermutation::new(64, true, None);
        assert_ne!(gen.next_permutation(1), gen.next_permutation(1));
    }

    #[test]
    fn test_importance_order_and_tie_break() {
        // counts: x1=2, x2=1, x3=2, x4=1
        let f = Formula::new(4, vec![vec![1, 3], vec![-1, -3], vec![2], vec![4]]).unwrap();
        let mut gen = FixedPermutation::by_importance(&f);
        assert_eq!(gen.order(), &[2, 0, 3, 1]);
        let batch = gen.next_permutation(3);
        assert_eq!(batch, vec![vec![2, 0, 3, 1]; 3]);
        assert_eq!(batch, gen.next_permutation(3));
    }

    #[test]
    fn test_unused_variables_still_ordered() {
        let f = Formula::new(3, vec![vec![2]]).unwrap();
        let gen = FixedPermutation::by_importance(&f);
        assert_eq!(gen.order(), &[1, 2, 0]);
    }

    #[test]
    fn test_identity() {
        let mut gen = FixedPermutation::identity(4);
        assert_eq!(gen.next_permutation(2), vec![vec![0, 1, 2, 3]; 2]);
    }

    #[test]
    fn test_inverse() {
        assert_eq!(inverse(&[2, 0, 3, 1]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_config_build_and_toml() {
        let f = Formula::new(3, vec![vec![1, 2, 3]]).unwrap();
        let cfg: PermutationConfig = serde_json::from_str(r#"{"kind": "identity"}"#).unwrap();
        assert_eq!(cfg.build(&f).next_permutation(1), vec![vec![0, 1, 2]]);

        let cfg: PermutationConfig = serde_json::from_str(r#"{"kind": "random", "seed": 3}"#).unwrap();
        assert_eq!(
            cfg,
            PermutationConfig::Random {
                seed: Some(3),
                independent_rows: true
            }
        );
        assert_eq!(cfg.build(&f).num_variables(), 3);
    }
}
