//! Per-variable features and optional formula context fed to the policy.
//!
//! Features are computed once per formula and kept on the host as flat
//! `Vec<f32>`; the runner uploads them as tensors at the start of each episode.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::network::PolicyNetwork;

/// Pretrained literal embeddings (e.g. node2vec over the literal-clause graph).
///
/// `positive[v]` embeds literal `v + 1`, `negative[v]` embeds `-(v + 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralEmbeddings {
    pub dim: usize,
    pub positive: Vec<Vec<f32>>,
    pub negative: Vec<Vec<f32>>,
}

impl LiteralEmbeddings {
    /// Load embeddings from a JSON file.
    pub fn from_json(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        let embeddings: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            dim = embeddings.dim,
            num_variables = embeddings.positive.len(),
            "Loaded literal embeddings"
        );
        Ok(embeddings)
    }

    /// Check that every variable has both literal embeddings at width `dim`.
    pub fn validate(&self, num_variables: usize) -> Result<(), PolicyError> {
        for table in [&self.positive, &self.negative] {
            if table.len() != num_variables {
                return Err(PolicyError::EmbeddingCount {
                    expected: num_variables,
                    actual: table.len(),
                });
            }
        }
        for (v, (pos, neg)) in self.positive.iter().zip(&self.negative).enumerate() {
            for (sign, row) in [("", pos), ("-", neg)] {
                if row.len() != self.dim {
                    return Err(PolicyError::EmbeddingWidth {
                        literal: format!("{sign}{}", v + 1),
                        expected: self.dim,
                        actual: row.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Variable features `(n, variable_dim)` and optional context `(n, context_dim)`.
#[derive(Debug, Clone)]
pub struct FormulaEncoding {
    num_variables: usize,
    variable_dim: usize,
    variables: Vec<f32>,
    context_dim: usize,
    context: Option<Vec<f32>>,
}

impl FormulaEncoding {
    /// One-hot identity features, no context.
    pub fn basic(num_variables: usize) -> Self {
        let mut variables = vec![0.0f32; num_variables * num_variables];
        for v in 0..num_variables {
            variables[v * num_variables + v] = 1.0;
        }
        Self {
            num_variables,
            variable_dim: num_variables,
            variables,
            context_dim: 0,
            context: None,
        }
    }

    /// Concatenate the embeddings of `v` and `¬v` per variable.
    ///
    /// With `with_context`, every variable also receives the mean of all
    /// variable features as context.
    pub fn from_literal_embeddings(
        embeddings: &LiteralEmbeddings,
        num_variables: usize,
        with_context: bool,
    ) -> Result<Self, PolicyError> {
        embeddings.validate(num_variables)?;
        let variable_dim = 2 * embeddings.dim;

        let mut variables = Vec::with_capacity(num_variables * variable_dim);
        for (pos, neg) in embeddings.positive.iter().zip(&embeddings.negative) {
            variables.extend_from_slice(pos);
            variables.extend_from_slice(neg);
        }

        let context = with_context.then(|| {
            let mut mean = vec![0.0f32; variable_dim];
            for row in variables.chunks(variable_dim) {
                for (m, x) in mean.iter_mut().zip(row) {
                    *m += x;
                }
            }
            let scale = 1.0 / num_variables.max(1) as f32;
            mean.iter_mut().for_each(|m| *m *= scale);
            mean.repeat(num_variables)
        });

        Ok(Self {
            num_variables,
            variable_dim,
            variables,
            context_dim: if with_context { variable_dim } else { 0 },
            context,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn variable_dim(&self) -> usize {
        self.variable_dim
    }

    /// 0 when the encoding carries no context.
    pub fn context_dim(&self) -> usize {
        self.context_dim
    }

    /// Feature row of variable `v`.
    pub fn variable_row(&self, v: usize) -> &[f32] {
        &self.variables[v * self.variable_dim..(v + 1) * self.variable_dim]
    }

    pub fn variable_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.variables.clone(), [self.num_variables, self.variable_dim]),
            device,
        )
    }

    pub fn context_tensor<B: Backend>(&self, device: &B::Device) -> Option<Tensor<B, 2>> {
        self.context.as_ref().map(|ctx| {
            Tensor::from_data(
                TensorData::new(ctx.clone(), [self.num_variables, self.context_dim]),
                device,
            )
        })
    }

    /// Check that a policy was built for this encoding's feature widths.
    pub fn check_compatible<B: Backend, P: PolicyNetwork<B> + ?Sized>(
        &self,
        policy: &P,
    ) -> Result<(), PolicyError> {
        if policy.variable_dim() != self.variable_dim {
            return Err(PolicyError::FeatureMismatch {
                what: "variable",
                expected: policy.variable_dim(),
                actual: self.variable_dim,
            });
        }
        if policy.context_dim() != self.context_dim {
            return Err(PolicyError::FeatureMismatch {
                what: "context",
                expected: policy.context_dim(),
                actual: self.context_dim,
            });
        }
        Ok(())
    }
}
