//! Deterministic policies for testing rollouts and training without a network.

use burn::prelude::*;
use burn::tensor::TensorData;

use policy::{
    Decoder, IncrementalDecoder, PolicyNetwork, PrefixDecoder, PrefixInput, RecurrentState,
    StepInput, ACTION_TOKENS,
};

fn matrix<B: Backend>(values: &[f32], rows: usize, cols: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values.to_vec(), [rows, cols]), device)
}

/// `(batch, t, k) @ (k, m)` via a flattened matmul.
fn matmul_3d<B: Backend>(x: Tensor<B, 3>, w: Tensor<B, 2>) -> Tensor<B, 3> {
    let [b, t, k] = x.dims();
    let m = w.dims()[1];
    x.reshape([b * t, k]).matmul(w).reshape([b, t, m])
}

fn empty_state<B: Backend>() -> RecurrentState<B> {
    RecurrentState {
        hidden: Vec::new(),
        cell: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// FixedLogitsPolicy
// ---------------------------------------------------------------------------

/// Emits `variable @ table`. With one-hot features, variable `v` always gets
/// row `v` of the table, whatever its position in the order.
#[derive(Debug, Clone)]
pub struct FixedLogitsPolicy {
    table: Vec<f32>,
    variable_dim: usize,
    arity: usize,
    prefix: bool,
}

impl FixedLogitsPolicy {
    /// One row of logits per variable; every row has the same width (1 or 2).
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        let arity = rows.first().map_or(1, Vec::len);
        assert!(rows.iter().all(|r| r.len() == arity), "ragged logits table");
        Self {
            variable_dim: rows.len(),
            table: rows.into_iter().flatten().collect(),
            arity,
            prefix: false,
        }
    }

    /// Decode through the prefix (attention) contract instead.
    pub fn as_prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    fn table<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        matrix(&self.table, self.variable_dim, self.arity, device)
    }
}

impl<B: Backend> IncrementalDecoder<B> for FixedLogitsPolicy {
    fn initial_state(&self, _batch_size: usize, _device: &B::Device) -> RecurrentState<B> {
        empty_state()
    }

    fn step(
        &self,
        input: StepInput<B>,
        state: RecurrentState<B>,
    ) -> (Tensor<B, 2>, RecurrentState<B>) {
        let table = self.table::<B>(&input.variable.device());
        (input.variable.matmul(table), state)
    }
}

impl<B: Backend> PrefixDecoder<B> for FixedLogitsPolicy {
    fn forward_prefix(
        &self,
        input: PrefixInput<B>,
        _causal_mask: Tensor<B, 3, Bool>,
    ) -> Tensor<B, 3> {
        let table = self.table::<B>(&input.variables.device());
        matmul_3d(input.variables, table)
    }
}

impl<B: Backend> PolicyNetwork<B> for FixedLogitsPolicy {
    fn output_arity(&self) -> usize {
        self.arity
    }

    fn variable_dim(&self) -> usize {
        self.variable_dim
    }

    fn context_dim(&self) -> usize {
        0
    }

    fn decoder(&self) -> Decoder<'_, B> {
        if self.prefix {
            Decoder::Prefix(self)
        } else {
            Decoder::Incremental(self)
        }
    }
}

// ---------------------------------------------------------------------------
// AlternatingPolicy
// ---------------------------------------------------------------------------

/// Chooses 1 after the start token, then the opposite of the previous action.
/// Depends only on the previous-action input.
#[derive(Debug, Clone)]
pub struct AlternatingPolicy {
    variable_dim: usize,
    prefix: bool,
}

/// Categorical logits per previous token: 0 -> pick 1, 1 -> pick 0, start -> pick 1.
const ALTERNATE: [f32; ACTION_TOKENS * 2] = [-10.0, 10.0, 10.0, -10.0, -10.0, 10.0];

impl AlternatingPolicy {
    pub fn new(variable_dim: usize) -> Self {
        Self {
            variable_dim,
            prefix: false,
        }
    }

    pub fn as_prefix(mut self) -> Self {
        self.prefix = true;
        self
    }
}

impl<B: Backend> IncrementalDecoder<B> for AlternatingPolicy {
    fn initial_state(&self, _batch_size: usize, _device: &B::Device) -> RecurrentState<B> {
        empty_state()
    }

    fn step(
        &self,
        input: StepInput<B>,
        state: RecurrentState<B>,
    ) -> (Tensor<B, 2>, RecurrentState<B>) {
        let w = matrix(&ALTERNATE, ACTION_TOKENS, 2, &input.prev_action.device());
        (input.prev_action.matmul(w), state)
    }
}

impl<B: Backend> PrefixDecoder<B> for AlternatingPolicy {
    fn forward_prefix(
        &self,
        input: PrefixInput<B>,
        _causal_mask: Tensor<B, 3, Bool>,
    ) -> Tensor<B, 3> {
        let w = matrix(&ALTERNATE, ACTION_TOKENS, 2, &input.prev_actions.device());
        matmul_3d(input.prev_actions, w)
    }
}

impl<B: Backend> PolicyNetwork<B> for AlternatingPolicy {
    fn output_arity(&self) -> usize {
        2
    }

    fn variable_dim(&self) -> usize {
        self.variable_dim
    }

    fn context_dim(&self) -> usize {
        0
    }

    fn decoder(&self) -> Decoder<'_, B> {
        if self.prefix {
            Decoder::Prefix(self)
        } else {
            Decoder::Incremental(self)
        }
    }
}
