//! Single-step wrappers around burn's GRU and LSTM.
//!
//! burn's recurrent modules consume whole sequences. The episode runner
//! decides one variable at a time, so each wrapper feeds a length-1 sequence
//! together with the carried state and hands the new state back.

use burn::nn::gru::{Gru, GruConfig};
use burn::nn::{Lstm, LstmConfig, LstmState};
use burn::prelude::*;

/// One GRU layer stepped once per call.
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    gru: Gru<B>,
}

impl<B: Backend> GruCell<B> {
    pub fn new(d_input: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            gru: GruConfig::new(d_input, hidden_size, true).init(device),
        }
    }

    /// `x`: `(batch, d_input)`, `h`: `(batch, hidden)` → `(batch, hidden)`.
    pub fn forward(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        self.gru
            .forward(x.unsqueeze_dim(1), Some(h.unsqueeze_dim(1)))
            .squeeze::<2>(1)
    }
}

/// One LSTM layer stepped once per call.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    lstm: Lstm<B>,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(d_input: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            lstm: LstmConfig::new(d_input, hidden_size, true).init(device),
        }
    }

    /// Returns `(h', c')`, each `(batch, hidden)`.
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        h: Tensor<B, 2>,
        c: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (_, state) = self
            .lstm
            .forward(x.unsqueeze_dim(1), Some(LstmState::new(c, h)));
        (state.hidden, state.cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_gru_shapes_and_bounds() {
        let device = Default::default();
        let cell = GruCell::<TestBackend>::new(5, 7, &device);
        let x = Tensor::random([3, 5], Distribution::Normal(0.0, 1.0), &device);
        let h = Tensor::zeros([3, 7], &device);
        let h1 = cell.forward(x, h);
        assert_eq!(h1.dims(), [3, 7]);
        // Convex mix of tanh output and a zero state stays in (-1, 1).
        let max: f32 = h1.abs().max().into_scalar().elem();
        assert!(max < 1.0, "max |h| = {max}");
    }

    #[test]
    fn test_lstm_shapes() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(4, 6, &device);
        let x = Tensor::random([2, 4], Distribution::Normal(0.0, 1.0), &device);
        let (h, c) = cell.forward(x, Tensor::zeros([2, 6], &device), Tensor::zeros([2, 6], &device));
        assert_eq!(h.dims(), [2, 6]);
        assert_eq!(c.dims(), [2, 6]);
    }

    #[test]
    fn test_lstm_steps_match_sequence_forward() {
        // Stepping one variable at a time equals burn's full-sequence pass.
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(3, 5, &device);
        let xs = Tensor::<TestBackend, 3>::random([2, 4, 3], Distribution::Normal(0.0, 1.0), &device);
        let (full, _) = cell.lstm.forward(xs.clone(), None);

        let mut h = Tensor::zeros([2, 5], &device);
        let mut c = Tensor::zeros([2, 5], &device);
        for t in 0..4 {
            let x = xs.clone().narrow(1, t, 1).squeeze::<2>(1);
            (h, c) = cell.forward(x, h, c);
            let expected = full.clone().narrow(1, t, 1).squeeze::<2>(1);
            let diff: f32 = (h.clone() - expected).abs().max().into_scalar().elem();
            assert!(diff < 1e-5, "step {t}: diff {diff}");
        }
    }

    #[test]
    fn test_state_changes_output() {
        let device = Default::default();
        let cell = GruCell::<TestBackend>::new(3, 4, &device);
        let x = Tensor::<TestBackend, 2>::ones([1, 3], &device);
        let a = cell.forward(x.clone(), Tensor::zeros([1, 4], &device));
        let b = cell.forward(x, Tensor::ones([1, 4], &device));
        let diff: f32 = (a - b).abs().sum().into_scalar().elem();
        assert!(diff > 1e-6);
    }
}
