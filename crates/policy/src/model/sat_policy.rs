use std::path::Path;

use burn::module::Param;
use burn::nn::transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::model::cells::{GruCell, LstmCell};
use crate::network::{
    Decoder, IncrementalDecoder, PolicyNetwork, PrefixDecoder, PrefixInput, RecurrentState,
    StepInput, ACTION_TOKENS,
};

/// Recurrent cell family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrentCell {
    Gru,
    Lstm,
}

/// Decoder family and its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecoderConfig {
    Recurrent {
        cell: RecurrentCell,
        hidden_size: usize,
        num_layers: usize,
        /// Learn the initial hidden (and cell) state instead of starting from zeros.
        #[serde(default)]
        trainable_state: bool,
    },
    Transformer {
        model_dim: usize,
        num_heads: usize,
        dense_size: usize,
        num_layers: usize,
    },
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::Recurrent {
            cell: RecurrentCell::Gru,
            hidden_size: 128,
            num_layers: 1,
            trainable_state: false,
        }
    }
}

/// Configuration for [`SatPolicy`].
///
/// ```text
/// variable (F) ─ Linear → var_emb_size        ┐
/// prev action (3) ─ Linear → assignment_emb   ├ concat → decoder → Linear → output_size
/// context (C) ─ Linear → context_emb_size     ┘
/// ```
#[derive(Config, Debug)]
pub struct SatPolicyConfig {
    /// Width of the per-variable feature (e.g. `n` for one-hot, `2 * dim` for literal embeddings).
    pub variable_dim: usize,
    /// Width of the context feature; 0 disables context.
    #[config(default = 0)]
    pub context_dim: usize,
    #[config(default = 64)]
    pub var_emb_size: usize,
    #[config(default = 64)]
    pub assignment_emb_size: usize,
    #[config(default = 64)]
    pub context_emb_size: usize,
    /// Logits per decision: 1 (Bernoulli) or 2 (categorical).
    #[config(default = 2)]
    pub output_size: usize,
    /// Dropout inside transformer layers.
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = "DecoderConfig::default()")]
    pub decoder: DecoderConfig,
}

impl SatPolicyConfig {
    /// Reject configurations that cannot build a usable policy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |msg: String| Err(PolicyError::InvalidConfig(msg));

        if self.output_size != 1 && self.output_size != 2 {
            return invalid(format!("output_size must be 1 or 2, got {}", self.output_size));
        }
        if self.variable_dim == 0 {
            return invalid("variable_dim must be > 0".into());
        }
        if self.var_emb_size == 0 || self.assignment_emb_size == 0 {
            return invalid("embedding sizes must be > 0".into());
        }
        if self.context_dim > 0 && self.context_emb_size == 0 {
            return invalid("context_emb_size must be > 0 when context is enabled".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        match &self.decoder {
            DecoderConfig::Recurrent {
                hidden_size,
                num_layers,
                ..
            } => {
                if *hidden_size == 0 || *num_layers == 0 {
                    return invalid("recurrent hidden_size and num_layers must be > 0".into());
                }
            }
            DecoderConfig::Transformer {
                model_dim,
                num_heads,
                dense_size,
                num_layers,
            } => {
                if *model_dim == 0 || *num_heads == 0 || *dense_size == 0 || *num_layers == 0 {
                    return invalid("transformer dimensions and num_layers must be > 0".into());
                }
                if model_dim % num_heads != 0 {
                    return invalid(format!(
                        "model_dim {model_dim} is not divisible by num_heads {num_heads}"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Width of the concatenated step input.
    fn input_width(&self) -> usize {
        let context = if self.context_dim > 0 {
            self.context_emb_size
        } else {
            0
        };
        self.var_emb_size + self.assignment_emb_size + context
    }

    /// Validate and initialize a policy.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SatPolicy<B>, PolicyError> {
        self.validate()?;

        let input = InputEmbedding {
            variable: LinearConfig::new(self.variable_dim, self.var_emb_size).init(device),
            action: LinearConfig::new(ACTION_TOKENS, self.assignment_emb_size).init(device),
            context: (self.context_dim > 0)
                .then(|| LinearConfig::new(self.context_dim, self.context_emb_size).init(device)),
        };
        let d_input = self.input_width();

        let (recurrent, attention) = match &self.decoder {
            DecoderConfig::Recurrent {
                cell,
                hidden_size,
                num_layers,
                trainable_state,
            } => {
                let (hs, nl) = (*hidden_size, *num_layers);
                let layer_input = |l: usize| if l == 0 { d_input } else { hs };
                let (gru, lstm) = match cell {
                    RecurrentCell::Gru => (
                        (0..nl).map(|l| GruCell::new(layer_input(l), hs, device)).collect(),
                        Vec::new(),
                    ),
                    RecurrentCell::Lstm => (
                        Vec::new(),
                        (0..nl).map(|l| LstmCell::new(layer_input(l), hs, device)).collect(),
                    ),
                };
                let init_state = || Param::from_tensor(Tensor::zeros([nl, hs], device));
                let policy = RecurrentPolicy {
                    input,
                    gru,
                    lstm,
                    init_hidden: trainable_state.then(init_state),
                    init_cell: (*trainable_state && *cell == RecurrentCell::Lstm)
                        .then(init_state),
                    output: LinearConfig::new(hs, self.output_size).init(device),
                    hidden_size: hs,
                };
                (Some(policy), None)
            }
            DecoderConfig::Transformer {
                model_dim,
                num_heads,
                dense_size,
                num_layers,
            } => {
                let policy = AttentionPolicy {
                    input,
                    projection: LinearConfig::new(d_input, *model_dim).init(device),
                    encoder: TransformerEncoderConfig::new(
                        *model_dim,
                        *dense_size,
                        *num_heads,
                        *num_layers,
                    )
                    .with_dropout(self.dropout)
                    .init(device),
                    output: LinearConfig::new(*model_dim, self.output_size).init(device),
                };
                (None, Some(policy))
            }
        };

        Ok(SatPolicy {
            recurrent,
            attention,
            output_size: self.output_size,
            variable_dim: self.variable_dim,
            context_dim: self.context_dim,
        })
    }
}

/// Projects variable, previous action and context, then concatenates them.
#[derive(Module, Debug)]
pub struct InputEmbedding<B: Backend> {
    variable: Linear<B>,
    action: Linear<B>,
    context: Option<Linear<B>>,
}

impl<B: Backend> InputEmbedding<B> {
    /// Works on `(batch, F)` steps and `(batch, t, F)` prefixes alike.
    pub fn forward<const D: usize>(
        &self,
        variable: Tensor<B, D>,
        prev_action: Tensor<B, D>,
        context: Option<Tensor<B, D>>,
    ) -> Tensor<B, D> {
        let mut parts = vec![self.variable.forward(variable), self.action.forward(prev_action)];
        match (&self.context, context) {
            (Some(layer), Some(ctx)) => parts.push(layer.forward(ctx)),
            (None, None) => {}
            (Some(_), None) => panic!("policy expects a context feature but none was given"),
            (None, Some(_)) => panic!("policy was built without context but one was given"),
        }
        Tensor::cat(parts, D - 1)
    }
}

/// Stacked GRU or LSTM decoder. Exactly one of `gru` / `lstm` is non-empty.
#[derive(Module, Debug)]
pub struct RecurrentPolicy<B: Backend> {
    input: InputEmbedding<B>,
    gru: Vec<GruCell<B>>,
    lstm: Vec<LstmCell<B>>,
    /// Learned initial hidden state, `(num_layers, hidden)`.
    init_hidden: Option<Param<Tensor<B, 2>>>,
    /// Learned initial LSTM cell state, `(num_layers, hidden)`.
    init_cell: Option<Param<Tensor<B, 2>>>,
    output: Linear<B>,
    hidden_size: usize,
}

impl<B: Backend> RecurrentPolicy<B> {
    fn num_layers(&self) -> usize {
        self.gru.len().max(self.lstm.len())
    }

    fn broadcast_init(
        &self,
        init: &Option<Param<Tensor<B, 2>>>,
        batch_size: usize,
        device: &B::Device,
    ) -> Vec<Tensor<B, 2>> {
        (0..self.num_layers())
            .map(|l| {
                let zeros = Tensor::zeros([batch_size, self.hidden_size], device);
                match init {
                    Some(p) => zeros + p.val().narrow(0, l, 1),
                    None => zeros,
                }
            })
            .collect()
    }
}

impl<B: Backend> IncrementalDecoder<B> for RecurrentPolicy<B> {
    fn initial_state(&self, batch_size: usize, device: &B::Device) -> RecurrentState<B> {
        let hidden = self.broadcast_init(&self.init_hidden, batch_size, device);
        let cell = if self.lstm.is_empty() {
            Vec::new()
        } else {
            self.broadcast_init(&self.init_cell, batch_size, device)
        };
        RecurrentState { hidden, cell }
    }

    fn step(
        &self,
        input: StepInput<B>,
        state: RecurrentState<B>,
    ) -> (Tensor<B, 2>, RecurrentState<B>) {
        let mut x = self
            .input
            .forward(input.variable, input.prev_action, input.context);

        let mut hidden = Vec::with_capacity(state.hidden.len());
        let mut cell = Vec::with_capacity(state.cell.len());
        if self.lstm.is_empty() {
            for (layer, h) in self.gru.iter().zip(state.hidden) {
                let h = layer.forward(x, h);
                x = h.clone();
                hidden.push(h);
            }
        } else {
            for ((layer, h), c) in self.lstm.iter().zip(state.hidden).zip(state.cell) {
                let (h, c) = layer.forward(x, h, c);
                x = h.clone();
                hidden.push(h);
                cell.push(c);
            }
        }

        (self.output.forward(x), RecurrentState { hidden, cell })
    }
}

/// Causal transformer decoder over the decided prefix.
#[derive(Module, Debug)]
pub struct AttentionPolicy<B: Backend> {
    input: InputEmbedding<B>,
    projection: Linear<B>,
    encoder: TransformerEncoder<B>,
    output: Linear<B>,
}

impl<B: Backend> PrefixDecoder<B> for AttentionPolicy<B> {
    fn forward_prefix(
        &self,
        input: PrefixInput<B>,
        causal_mask: Tensor<B, 3, Bool>,
    ) -> Tensor<B, 3> {
        let x = self
            .input
            .forward(input.variables, input.prev_actions, input.context);
        let x = self.projection.forward(x);
        let x = self
            .encoder
            .forward(TransformerEncoderInput::new(x).mask_attn(causal_mask));
        self.output.forward(x)
    }
}

/// Autoregressive assignment policy with a recurrent or attention decoder.
#[derive(Module, Debug)]
pub struct SatPolicy<B: Backend> {
    recurrent: Option<RecurrentPolicy<B>>,
    attention: Option<AttentionPolicy<B>>,
    output_size: usize,
    variable_dim: usize,
    context_dim: usize,
}

impl<B: Backend> SatPolicy<B> {
    /// Short name of the decoder family, for logs.
    pub fn decoder_kind(&self) -> &'static str {
        match (&self.recurrent, &self.attention) {
            (Some(r), _) if r.lstm.is_empty() => "gru",
            (Some(_), _) => "lstm",
            _ => "transformer",
        }
    }

    /// Save weights as a named MessagePack record.
    pub fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()> {
        self.clone()
            .save_file(path.to_path_buf(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|e| anyhow::anyhow!("Failed to save policy to {}: {e}", path.display()))
    }

    /// Build a policy from `config` and load saved weights on top.
    pub fn load_checkpoint(
        config: &SatPolicyConfig,
        path: &Path,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        let model = config
            .init::<B>(device)?
            .load_file(
                path.to_path_buf(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
                device,
            )
            .map_err(|e| anyhow::anyhow!("Failed to load policy from {}: {e}", path.display()))?;
        Ok(model)
    }
}

impl<B: Backend> PolicyNetwork<B> for SatPolicy<B> {
    fn output_arity(&self) -> usize {
        self.output_size
    }

    fn variable_dim(&self) -> usize {
        self.variable_dim
    }

    fn context_dim(&self) -> usize {
        self.context_dim
    }

    fn decoder(&self) -> Decoder<'_, B> {
        match (&self.recurrent, &self.attention) {
            (Some(r), _) => Decoder::Incremental(r),
            (None, Some(a)) => Decoder::Prefix(a),
            (None, None) => unreachable!("SatPolicy is always built with a decoder"),
        }
    }
}
