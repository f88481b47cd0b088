//! Contract between an assignment policy and the episode runner.
//!
//! A policy decides one variable per step. Recurrent families carry a hidden
//! state from step to step ([`IncrementalDecoder`]); attention families
//! re-read the whole prefix under a causal mask ([`PrefixDecoder`]). The
//! runner asks [`PolicyNetwork::decoder`] once per episode and dispatches on
//! the returned [`Decoder`].

use burn::prelude::*;
use burn::tensor::TensorData;

/// Size of the previous-action vocabulary: assignment 0, assignment 1, and the start sentinel.
pub const ACTION_TOKENS: usize = 3;

/// Token fed at the first step, before any variable has been decided.
pub const START_TOKEN: usize = 2;

/// Per-step input for incremental decoding.
#[derive(Debug, Clone)]
pub struct StepInput<B: Backend> {
    /// Feature of the variable being decided, `(batch, variable_dim)`.
    pub variable: Tensor<B, 2>,
    /// One-hot of the previous action, `(batch, ACTION_TOKENS)`.
    pub prev_action: Tensor<B, 2>,
    /// Formula context for this variable, `(batch, context_dim)`, if enabled.
    pub context: Option<Tensor<B, 2>>,
}

/// Full-prefix input for attention decoding. Position `t` holds the
/// variable decided at step `t` and the action taken at step `t - 1`.
#[derive(Debug, Clone)]
pub struct PrefixInput<B: Backend> {
    /// `(batch, t, variable_dim)`
    pub variables: Tensor<B, 3>,
    /// `(batch, t, ACTION_TOKENS)`
    pub prev_actions: Tensor<B, 3>,
    /// `(batch, t, context_dim)`
    pub context: Option<Tensor<B, 3>>,
}

/// Hidden state carried by recurrent decoders, one tensor per layer.
///
/// `cell` is empty for GRU stacks and holds the LSTM cell state otherwise.
#[derive(Debug, Clone)]
pub struct RecurrentState<B: Backend> {
    pub hidden: Vec<Tensor<B, 2>>,
    pub cell: Vec<Tensor<B, 2>>,
}

/// Step-by-step decoding with carried state.
pub trait IncrementalDecoder<B: Backend> {
    /// State before the first step, `(batch, hidden)` per layer.
    fn initial_state(&self, batch_size: usize, device: &B::Device) -> RecurrentState<B>;

    /// Decide one variable. Returns logits `(batch, arity)` and the next state.
    fn step(
        &self,
        input: StepInput<B>,
        state: RecurrentState<B>,
    ) -> (Tensor<B, 2>, RecurrentState<B>);
}

/// Whole-prefix decoding under a causal mask.
pub trait PrefixDecoder<B: Backend> {
    /// Logits for every prefix position, `(batch, t, arity)`.
    ///
    /// `causal_mask` is `(batch, t, t)` with `true` marking positions a
    /// query may not attend to.
    fn forward_prefix(&self, input: PrefixInput<B>, causal_mask: Tensor<B, 3, Bool>)
        -> Tensor<B, 3>;
}

/// The decoding capability a policy exposes for one episode.
pub enum Decoder<'a, B: Backend> {
    Incremental(&'a dyn IncrementalDecoder<B>),
    Prefix(&'a dyn PrefixDecoder<B>),
}

/// A trainable policy that assigns CNF variables one at a time.
pub trait PolicyNetwork<B: Backend> {
    /// Logit width per decision: 1 (Bernoulli) or 2 (categorical over {0, 1}).
    fn output_arity(&self) -> usize;

    /// Width of the per-variable feature the policy was built for.
    fn variable_dim(&self) -> usize;

    /// Width of the context feature, 0 when the policy takes no context.
    fn context_dim(&self) -> usize;

    /// Decoding interface for this policy's decoder family.
    fn decoder(&self) -> Decoder<'_, B>;
}

/// One-hot encode previous-action tokens into `(batch, ACTION_TOKENS)`.
///
/// # Panics
/// Panics if a token is not below [`ACTION_TOKENS`].
pub fn action_one_hot<B: Backend>(tokens: &[usize], device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0f32; tokens.len() * ACTION_TOKENS];
    for (row, &token) in tokens.iter().enumerate() {
        assert!(token < ACTION_TOKENS, "action token {token} out of range");
        data[row * ACTION_TOKENS + token] = 1.0;
    }
    Tensor::from_data(TensorData::new(data, [tokens.len(), ACTION_TOKENS]), device)
}
