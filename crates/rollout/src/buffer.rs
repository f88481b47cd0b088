//! Trajectory buffer produced by one episode.

use burn::prelude::*;

/// Everything recorded during one batched episode, indexed by variable id.
///
/// Decisions happen in permutation order but are stored at the variable's
/// own position, so `actions[r][v]` is the value of variable `v` in rollout
/// `r` regardless of when it was decided. Tensors stay on the autodiff graph
/// when the episode ran on an autodiff backend.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer<B: Backend> {
    /// Shaped logits, `(batch, n, arity)`.
    pub action_logits: Tensor<B, 3>,
    /// Distribution parameters, `(batch, n, arity)`: `P(x=1)` for arity 1, the softmax for arity 2.
    pub action_probs: Tensor<B, 3>,
    /// Log-probability of the chosen action, `(batch, n)`.
    pub action_log_prob: Tensor<B, 2>,
    /// Chosen values, `batch` rows of `n` values in {0, 1}.
    pub actions: Vec<Vec<u8>>,
    /// Order in which each row decided its variables.
    pub permutation: Vec<Vec<usize>>,
}

impl<B: Backend> TrajectoryBuffer<B> {
    /// Assemble a buffer, asserting the shape contract.
    pub fn new(
        action_logits: Tensor<B, 3>,
        action_probs: Tensor<B, 3>,
        action_log_prob: Tensor<B, 2>,
        actions: Vec<Vec<u8>>,
        permutation: Vec<Vec<usize>>,
    ) -> Self {
        let [batch, n, arity] = action_logits.dims();
        assert!(arity == 1 || arity == 2, "arity must be 1 or 2, got {arity}");
        assert_eq!(action_probs.dims(), [batch, n, arity], "action_probs shape");
        assert_eq!(action_log_prob.dims(), [batch, n], "action_log_prob shape");
        assert_eq!(actions.len(), batch, "actions batch size");
        assert_eq!(permutation.len(), batch, "permutation batch size");
        for row in &actions {
            assert_eq!(row.len(), n, "actions row length");
            assert!(row.iter().all(|&a| a <= 1), "actions must be 0/1");
        }
        Self {
            action_logits,
            action_probs,
            action_log_prob,
            actions,
            permutation,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.actions.len()
    }

    pub fn num_variables(&self) -> usize {
        self.action_log_prob.dims()[1]
    }

    pub fn arity(&self) -> usize {
        self.action_logits.dims()[2]
    }

    /// Sum of log-probabilities over all decisions, `(batch,)`.
    pub fn log_prob_sum(&self) -> Tensor<B, 1> {
        self.action_log_prob.clone().sum_dim(1).squeeze::<1>(1)
    }

    /// Per-decision probabilities over {0, 1}, `(batch, n, 2)`.
    pub fn two_outcome_probs(&self) -> Tensor<B, 3> {
        if self.arity() == 2 {
            self.action_probs.clone()
        } else {
            let p1 = self.action_probs.clone();
            let p0 = p1.clone().neg().add_scalar(1.0);
            Tensor::cat(vec![p0, p1], 2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn bernoulli_buffer() -> TrajectoryBuffer<TestBackend> {
        let device = Default::default();
        let probs = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![0.25f32, 0.5, 0.9, 0.1], [2, 2, 1]),
            &device,
        );
        TrajectoryBuffer::new(
            Tensor::zeros([2, 2, 1], &device),
            probs,
            Tensor::from_data(TensorData::new(vec![-1.0f32, -2.0, -0.5, -0.25], [2, 2]), &device),
            vec![vec![0, 1], vec![1, 0]],
            vec![vec![0, 1], vec![1, 0]],
        )
    }

    #[test]
    fn test_dimensions() {
        let buf = bernoulli_buffer();
        assert_eq!(buf.batch_size(), 2);
        assert_eq!(buf.num_variables(), 2);
        assert_eq!(buf.arity(), 1);
    }

    #[test]
    fn test_log_prob_sum() {
        let sums = bernoulli_buffer().log_prob_sum().into_data().to_vec::<f32>().unwrap();
        assert_eq!(sums, vec![-3.0, -0.75]);
    }

    #[test]
    fn test_two_outcome_probs_from_bernoulli() {
        let probs = bernoulli_buffer().two_outcome_probs();
        assert_eq!(probs.dims(), [2, 2, 2]);
        let values = probs.into_data().to_vec::<f32>().unwrap();
        let expected = [0.75f32, 0.25, 0.5, 0.5, 0.1, 0.9, 0.9, 0.1];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "{values:?}");
        }
    }

    #[test]
    #[should_panic(expected = "actions row length")]
    fn test_shape_violation_panics() {
        let device = Default::default();
        let _ = TrajectoryBuffer::<TestBackend>::new(
            Tensor::zeros([1, 2, 2], &device),
            Tensor::zeros([1, 2, 2], &device),
            Tensor::zeros([1, 2], &device),
            vec![vec![0]],
            vec![vec![0, 1]],
        );
    }
}
