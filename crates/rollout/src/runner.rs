//! Episode runner: drives a policy over every variable in permutation order.
//!
//! ```text
//! INIT ──► DECIDE_STEP (× n, permutation order) ──► DONE (TrajectoryBuffer)
//! ```
//!
//! Each step gathers the current variable's feature and context, asks the
//! decoder for logits, shapes them, turns them into a Bernoulli or categorical
//! distribution, picks an action and feeds it back as the next step's
//! previous-action token.

use burn::nn::attention::generate_autoregressive_mask;
use burn::prelude::*;
use burn::tensor::activation::{log_softmax, sigmoid, softmax};
use burn::tensor::TensorData;
use rand::Rng;

use cnf::{inverse, PermutationPolicy};
use policy::bridge::tensor_to_vec;
use policy::{
    action_one_hot, Decoder, FormulaEncoding, PolicyError, PolicyNetwork, PrefixInput, StepInput,
    START_TOKEN,
};

use crate::buffer::TrajectoryBuffer;
use crate::strategy::{LogitShaping, Strategy};

/// Errors from configuring or running an episode.
#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("'{0}' is not a valid strategy, try 'greedy' or 'sampled'")]
    InvalidStrategy(String),
    #[error("logit clipping must be >= 1, got {0}")]
    InvalidClipping(f64),
    #[error("logit temperature must be >= 1, got {0}")]
    InvalidTemperature(f64),
    #[error("batch size must be >= 1")]
    EmptyBatch,
    #[error("policy does not match the formula encoding: {0}")]
    Policy(#[from] PolicyError),
}

/// Outputs of one decision step, in step order.
struct StepRecord<B: Backend> {
    logits: Tensor<B, 2>,
    probs: Tensor<B, 2>,
    log_prob: Tensor<B, 1>,
    actions: Vec<u8>,
}

/// Runs batched episodes of a policy over one formula encoding.
///
/// Holds no learning state; the same runner serves training rollouts,
/// baselines and evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeRunner<'a> {
    encoding: &'a FormulaEncoding,
    shaping: LogitShaping,
}

impl<'a> EpisodeRunner<'a> {
    pub fn new(encoding: &'a FormulaEncoding, shaping: LogitShaping) -> Self {
        Self { encoding, shaping }
    }

    /// Same runner with different logit shaping.
    pub fn with_shaping(self, shaping: LogitShaping) -> Self {
        Self { shaping, ..self }
    }

    pub fn shaping(&self) -> LogitShaping {
        self.shaping
    }

    pub fn num_variables(&self) -> usize {
        self.encoding.num_variables()
    }

    /// Run `batch_size` rollouts and return the trajectory buffer.
    ///
    /// # Panics
    /// Panics if the policy emits logits of width other than 1 or 2, or if
    /// `order` covers a different number of variables than the encoding.
    pub fn run<B, P, R>(
        &self,
        policy: &P,
        device: &B::Device,
        strategy: Strategy,
        batch_size: usize,
        order: &mut dyn PermutationPolicy,
        rng: &mut R,
    ) -> Result<TrajectoryBuffer<B>, RolloutError>
    where
        B: Backend,
        P: PolicyNetwork<B> + ?Sized,
        R: Rng + ?Sized,
    {
        if batch_size == 0 {
            return Err(RolloutError::EmptyBatch);
        }
        self.encoding.check_compatible::<B, P>(policy)?;
        let arity = policy.output_arity();
        assert!(arity == 1 || arity == 2, "policy output arity must be 1 or 2, got {arity}");

        let n = self.encoding.num_variables();
        assert_eq!(
            order.num_variables(),
            n,
            "permutation covers a different number of variables than the encoding"
        );
        let permutation = order.next_permutation(batch_size);

        let features = self.encoding.variable_tensor::<B>(device);
        let context = self.encoding.context_tensor::<B>(device);

        let mut steps: Vec<StepRecord<B>> = Vec::with_capacity(n);
        let mut prev_tokens = vec![START_TOKEN; batch_size];

        match policy.decoder() {
            Decoder::Incremental(dec) => {
                let mut state = dec.initial_state(batch_size, device);
                for t in 0..n {
                    let idx = step_indices::<B>(&permutation, t, device);
                    let input = StepInput {
                        variable: features.clone().select(0, idx.clone()),
                        prev_action: action_one_hot(&prev_tokens, device),
                        context: context.as_ref().map(|c| c.clone().select(0, idx)),
                    };
                    let (logits, next) = dec.step(input, state);
                    state = next;
                    let record = self.decide(logits, arity, strategy, rng, device);
                    prev_tokens = record.actions.iter().map(|&a| a as usize).collect();
                    steps.push(record);
                }
            }
            Decoder::Prefix(dec) => {
                let mut variables: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
                let mut contexts: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
                let mut prev_actions: Vec<Tensor<B, 2>> = Vec::with_capacity(n);
                for t in 0..n {
                    let idx = step_indices::<B>(&permutation, t, device);
                    variables.push(features.clone().select(0, idx.clone()));
                    if let Some(c) = &context {
                        contexts.push(c.clone().select(0, idx));
                    }
                    prev_actions.push(action_one_hot(&prev_tokens, device));

                    let input = PrefixInput {
                        variables: Tensor::stack(variables.clone(), 1),
                        prev_actions: Tensor::stack(prev_actions.clone(), 1),
                        context: context.as_ref().map(|_| Tensor::stack(contexts.clone(), 1)),
                    };
                    let mask = generate_autoregressive_mask::<B>(batch_size, t + 1, device);
                    let logits = dec
                        .forward_prefix(input, mask)
                        .narrow(1, t, 1)
                        .squeeze::<2>(1);
                    let record = self.decide(logits, arity, strategy, rng, device);
                    prev_tokens = record.actions.iter().map(|&a| a as usize).collect();
                    steps.push(record);
                }
            }
        }

        tracing::trace!(batch_size, n, %strategy, "Episode complete");
        Ok(assemble(steps, permutation, arity, device))
    }

    /// Shape logits, build the step distribution and pick actions.
    fn decide<B: Backend, R: Rng + ?Sized>(
        &self,
        logits: Tensor<B, 2>,
        arity: usize,
        strategy: Strategy,
        rng: &mut R,
        device: &B::Device,
    ) -> StepRecord<B> {
        let [batch, width] = logits.dims();
        assert_eq!(width, arity, "decoder emitted {width} logits, expected {arity}");
        let logits = self.shaping.apply(logits);

        // log P(0), log P(1) per row.
        let (probs, log_two) = if arity == 1 {
            let probs = sigmoid(logits.clone());
            let log_two = Tensor::cat(
                vec![log_sigmoid(logits.clone().neg()), log_sigmoid(logits.clone())],
                1,
            );
            (probs, log_two)
        } else {
            (softmax(logits.clone(), 1), log_softmax(logits.clone(), 1))
        };

        let p_one = tensor_to_vec(probs.clone().narrow(1, arity - 1, 1));
        let actions: Vec<u8> = p_one
            .iter()
            .map(|&p| match strategy {
                Strategy::Greedy => u8::from(p > 0.5),
                Strategy::Sampled => u8::from(rng.gen::<f32>() < p),
            })
            .collect();

        let mut chosen = vec![0.0f32; batch * 2];
        for (row, &a) in actions.iter().enumerate() {
            chosen[row * 2 + a as usize] = 1.0;
        }
        let mask = Tensor::<B, 2>::from_data(TensorData::new(chosen, [batch, 2]), device);
        let log_prob = (log_two * mask).sum_dim(1).squeeze::<1>(1);

        StepRecord {
            logits,
            probs,
            log_prob,
            actions,
        }
    }
}

/// `log σ(x)` without overflow for large `|x|`.
fn log_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_max(0.0) - x.abs().neg().exp().add_scalar(1.0).log()
}

/// Variable decided at step `t` in every batch row.
fn step_indices<B: Backend>(
    permutation: &[Vec<usize>],
    t: usize,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let idx: Vec<i64> = permutation.iter().map(|row| row[t] as i64).collect();
    let len = idx.len();
    Tensor::from_data(TensorData::new(idx, [len]), device)
}

/// Stack step records and move them from step order to variable order.
fn assemble<B: Backend>(
    steps: Vec<StepRecord<B>>,
    permutation: Vec<Vec<usize>>,
    arity: usize,
    device: &B::Device,
) -> TrajectoryBuffer<B> {
    let n = steps.len();
    let batch = permutation.len();
    let inverses: Vec<Vec<usize>> = permutation.iter().map(|p| inverse(p)).collect();

    let mut logits = Vec::with_capacity(n);
    let mut probs = Vec::with_capacity(n);
    let mut log_probs = Vec::with_capacity(n);
    let mut step_actions = Vec::with_capacity(n);
    for step in steps {
        logits.push(step.logits);
        probs.push(step.probs);
        log_probs.push(step.log_prob);
        step_actions.push(step.actions);
    }

    // gather index: position v reads the step at which v was decided.
    let idx2: Vec<i64> = inverses
        .iter()
        .flat_map(|inv| inv.iter().map(|&s| s as i64))
        .collect();
    let idx3: Vec<i64> = idx2
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(arity))
        .collect();
    let idx2 = Tensor::<B, 2, Int>::from_data(TensorData::new(idx2, [batch, n]), device);
    let idx3 = Tensor::<B, 3, Int>::from_data(TensorData::new(idx3, [batch, n, arity]), device);

    let action_logits = Tensor::stack::<3>(logits, 1).gather(1, idx3.clone());
    let action_probs = Tensor::stack::<3>(probs, 1).gather(1, idx3);
    let action_log_prob = Tensor::stack::<2>(log_probs, 1).gather(1, idx2);

    let actions: Vec<Vec<u8>> = inverses
        .iter()
        .enumerate()
        .map(|(row, inv)| inv.iter().map(|&step| step_actions[step][row]).collect())
        .collect();

    TrajectoryBuffer::new(action_logits, action_probs, action_log_prob, actions, permutation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{AlternatingPolicy, FixedLogitsPolicy};
    use burn::backend::ndarray::NdArray;
    use cnf::{FixedPermutation, RandomPermutation};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn run_with<P: PolicyNetwork<TestBackend>>(
        policy: &P,
        encoding: &FormulaEncoding,
        strategy: Strategy,
        batch: usize,
        order: &mut dyn PermutationPolicy,
    ) -> TrajectoryBuffer<TestBackend> {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(0);
        EpisodeRunner::new(encoding, LogitShaping::default())
            .run(policy, &device, strategy, batch, order, &mut rng)
            .unwrap()
    }

    #[test]
    fn test_shapes_and_binary_actions() {
        let encoding = FormulaEncoding::basic(5);
        for policy in [
            FixedLogitsPolicy::new(vec![vec![0.3]; 5]),
            FixedLogitsPolicy::new(vec![vec![0.1, -0.2]; 5]).as_prefix(),
        ] {
            let mut order = RandomPermutation::new(5, true, None);
            let buf = run_with(&policy, &encoding, Strategy::Sampled, 4, &mut order);
            assert_eq!(buf.action_logits.dims(), [4, 5, policy.arity()]);
            assert_eq!(buf.action_log_prob.dims(), [4, 5]);
            assert_eq!(buf.actions.len(), 4);
            assert!(buf.actions.iter().all(|r| r.len() == 5 && r.iter().all(|&a| a <= 1)));
        }
    }

    #[test]
    fn test_greedy_follows_logit_sign() {
        let encoding = FormulaEncoding::basic(3);
        let policy = FixedLogitsPolicy::new(vec![vec![2.0], vec![-2.0], vec![0.0]]);
        let mut order = FixedPermutation::identity(3);
        let buf = run_with(&policy, &encoding, Strategy::Greedy, 2, &mut order);
        // A zero logit is a tie and resolves to 0.
        assert_eq!(buf.actions, vec![vec![1, 0, 0]; 2]);
    }

    #[test]
    fn test_results_stored_by_variable_id() {
        // Distinct logits per variable, decided in reverse order.
        let encoding = FormulaEncoding::basic(3);
        let policy = FixedLogitsPolicy::new(vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![3.0, 0.0]]);
        let mut order = FixedPermutation::by_importance(
            &cnf::Formula::new(3, vec![vec![3], vec![3], vec![2, 3], vec![2]]).unwrap(),
        );
        assert_eq!(order.order(), &[2, 1, 0]);
        let buf = run_with(&policy, &encoding, Strategy::Greedy, 1, &mut order);

        let logits = tensor_to_vec(buf.action_logits.clone());
        assert_eq!(logits, vec![1.0, 0.0, 0.0, 2.0, 3.0, 0.0]);
        assert_eq!(buf.actions, vec![vec![0, 1, 0]]);
        assert_eq!(buf.permutation, vec![vec![2, 1, 0]]);
    }

    #[test]
    fn test_previous_action_threads_through_steps() {
        // Start token -> 1, then alternate. Order [2, 0, 1] gives x2=1, x0=0, x1=1.
        let encoding = FormulaEncoding::basic(3);
        struct Order;
        impl PermutationPolicy for Order {
            fn num_variables(&self) -> usize {
                3
            }
            fn next_permutation(&mut self, batch_size: usize) -> Vec<Vec<usize>> {
                vec![vec![2, 0, 1]; batch_size]
            }
        }
        for policy in [AlternatingPolicy::new(3), AlternatingPolicy::new(3).as_prefix()] {
            let buf = run_with(&policy, &encoding, Strategy::Greedy, 2, &mut Order);
            assert_eq!(buf.actions, vec![vec![0, 1, 1]; 2]);
        }
    }

    #[test]
    fn test_log_prob_matches_distribution() {
        let encoding = FormulaEncoding::basic(2);
        let policy = FixedLogitsPolicy::new(vec![vec![0.0], vec![1.5]]);
        let mut order = FixedPermutation::identity(2);
        let buf = run_with(&policy, &encoding, Strategy::Sampled, 8, &mut order);

        let log_probs = tensor_to_vec(buf.action_log_prob.clone());
        let p1 = 1.0 / (1.0 + (-1.5f32).exp());
        for (row, actions) in buf.actions.iter().enumerate() {
            let expected0 = 0.5f32.ln();
            let expected1 = if actions[1] == 1 { p1.ln() } else { (1.0 - p1).ln() };
            assert!((log_probs[row * 2] - expected0).abs() < 1e-5);
            assert!((log_probs[row * 2 + 1] - expected1).abs() < 1e-5);
        }
    }

    #[test]
    fn test_categorical_and_bernoulli_agree_on_greedy() {
        let encoding = FormulaEncoding::basic(4);
        let bern = FixedLogitsPolicy::new(vec![vec![1.0], vec![-1.0], vec![3.0], vec![-0.5]]);
        // Softmax over [0, l] equals sigmoid(l).
        let cat = FixedLogitsPolicy::new(vec![
            vec![0.0, 1.0],
            vec![0.0, -1.0],
            vec![0.0, 3.0],
            vec![0.0, -0.5],
        ]);
        let mut order = FixedPermutation::identity(4);
        let a = run_with(&bern, &encoding, Strategy::Greedy, 1, &mut order);
        let b = run_with(&cat, &encoding, Strategy::Greedy, 1, &mut order);
        assert_eq!(a.actions, b.actions);
        let (la, lb) = (tensor_to_vec(a.action_log_prob), tensor_to_vec(b.action_log_prob));
        for (x, y) in la.iter().zip(&lb) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        let encoding = FormulaEncoding::basic(2);
        let policy = FixedLogitsPolicy::new(vec![vec![0.0]; 2]);
        let device = Default::default();
        let err = EpisodeRunner::new(&encoding, LogitShaping::default())
            .run::<TestBackend, _, _>(
                &policy,
                &device,
                Strategy::Greedy,
                0,
                &mut FixedPermutation::identity(2),
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap_err();
        assert!(matches!(err, RolloutError::EmptyBatch));
    }

    #[test]
    fn test_mismatched_encoding_rejected() {
        let encoding = FormulaEncoding::basic(3);
        let policy = FixedLogitsPolicy::new(vec![vec![0.0]; 2]);
        let device = Default::default();
        let err = EpisodeRunner::new(&encoding, LogitShaping::default())
            .run::<TestBackend, _, _>(
                &policy,
                &device,
                Strategy::Greedy,
                1,
                &mut FixedPermutation::identity(3),
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap_err();
        assert!(matches!(err, RolloutError::Policy(_)));
    }
}
