//! TOML config loading for the `sat-pg` CLI.
//!
//! `configs/train.toml` has `[training]`, `[policy]` and `[encoding]` tables;
//! every key is optional. CLI flags are merged on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use policy::{DecoderConfig, SatPolicyConfig};
use trainer::TrainingConfig;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunToml {
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub policy: PolicyToml,
    #[serde(default)]
    pub encoding: EncodingToml,
}

/// Network hyperparameters; feature widths come from the encoding at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyToml {
    #[serde(default = "default_emb_size")]
    pub var_emb_size: usize,
    #[serde(default = "default_emb_size")]
    pub assignment_emb_size: usize,
    #[serde(default = "default_emb_size")]
    pub context_emb_size: usize,
    /// 1 for Bernoulli logits, 2 for categorical.
    #[serde(default = "default_output_size")]
    pub output_size: usize,
    #[serde(default)]
    pub dropout: f64,
    #[serde(default)]
    pub decoder: DecoderConfig,
}

fn default_emb_size() -> usize {
    64
}
fn default_output_size() -> usize {
    2
}

impl Default for PolicyToml {
    fn default() -> Self {
        Self {
            var_emb_size: default_emb_size(),
            assignment_emb_size: default_emb_size(),
            context_emb_size: default_emb_size(),
            output_size: default_output_size(),
            dropout: 0.0,
            decoder: DecoderConfig::default(),
        }
    }
}

impl PolicyToml {
    /// Full model config for the given feature widths.
    pub fn to_config(&self, variable_dim: usize, context_dim: usize) -> SatPolicyConfig {
        SatPolicyConfig::new(variable_dim)
            .with_context_dim(context_dim)
            .with_var_emb_size(self.var_emb_size)
            .with_assignment_emb_size(self.assignment_emb_size)
            .with_context_emb_size(self.context_emb_size)
            .with_output_size(self.output_size)
            .with_dropout(self.dropout)
            .with_decoder(self.decoder.clone())
    }
}

/// Variable feature source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodingToml {
    /// Literal embeddings JSON; one-hot features when absent.
    #[serde(default)]
    pub embeddings: Option<PathBuf>,
    /// Feed the mean variable embedding as context (embeddings only).
    #[serde(default)]
    pub context: bool,
}

/// Load and deserialize a `RunToml` from a TOML file.
pub fn load_run_toml(path: &Path) -> anyhow::Result<RunToml> {
    let contents = std::fs::read_to_string(path)?;
    let config: RunToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded run config");
    Ok(config)
}

/// CLI values that take priority over the TOML file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub num_samples: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
    pub embeddings: Option<PathBuf>,
}

/// Merge CLI overrides into a loaded config.
///
/// Priority chain: field defaults < TOML values < CLI flags.
pub fn apply_overrides(run: &mut RunToml, overrides: Overrides) {
    if let Some(n) = overrides.num_samples {
        run.training.num_samples = n;
    }
    if let Some(n) = overrides.batch_size {
        run.training.batch_size = n;
    }
    if let Some(seed) = overrides.seed {
        run.training.seed = Some(seed);
    }
    if let Some(path) = overrides.embeddings {
        run.encoding.embeddings = Some(path);
    }
}
