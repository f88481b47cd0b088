//! Neural assignment policies for CNF formulas.
//!
//! A policy reads one variable feature per step, plus the previous action and
//! an optional formula context, and emits the logits of that variable's value.
//! Recurrent decoders (GRU, LSTM) step incrementally with carried state; the
//! transformer decoder re-reads the whole decided prefix under a causal mask.
//!
//! # Key types
//!
//! - [`PolicyNetwork`]: what the episode runner needs from a policy
//! - [`IncrementalDecoder`] / [`PrefixDecoder`]: the two decoding contracts
//! - [`SatPolicy`] / [`SatPolicyConfig`]: the trainable burn module
//! - [`FormulaEncoding`]: one-hot or literal-embedding variable features

pub mod bridge;
pub mod encoding;
pub mod error;
pub mod model;
pub mod network;

pub use encoding::{FormulaEncoding, LiteralEmbeddings};
pub use error::PolicyError;
pub use model::sat_policy::{DecoderConfig, RecurrentCell, SatPolicy, SatPolicyConfig};
pub use network::{
    action_one_hot, Decoder, IncrementalDecoder, PolicyNetwork, PrefixDecoder, PrefixInput,
    RecurrentState, StepInput, ACTION_TOKENS, START_TOKEN,
};
