//! Action selection and logit shaping.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;

use crate::runner::RolloutError;

/// How each decision is taken from the step distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The distribution's mode. Ties resolve to 0.
    Greedy,
    /// A draw from the distribution.
    Sampled,
}

impl FromStr for Strategy {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(Self::Greedy),
            "sampled" => Ok(Self::Sampled),
            other => Err(RolloutError::InvalidStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Greedy => write!(f, "greedy"),
            Self::Sampled => write!(f, "sampled"),
        }
    }
}

/// Optional logit reshaping: `C * tanh(l)` then `l / T`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogitShaping {
    clipping: Option<f64>,
    temperature: Option<f64>,
}

impl LogitShaping {
    /// Both factors must be at least 1 when set.
    pub fn new(clipping: Option<f64>, temperature: Option<f64>) -> Result<Self, RolloutError> {
        if let Some(c) = clipping {
            if c.is_nan() || c < 1.0 {
                return Err(RolloutError::InvalidClipping(c));
            }
        }
        if let Some(t) = temperature {
            if t.is_nan() || t < 1.0 {
                return Err(RolloutError::InvalidTemperature(t));
            }
        }
        Ok(Self {
            clipping,
            temperature,
        })
    }

    /// Same clipping, no temperature. Training rollouts use this.
    pub fn without_temperature(self) -> Self {
        Self {
            temperature: None,
            ..self
        }
    }

    pub fn clipping(&self) -> Option<f64> {
        self.clipping
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn apply<B: Backend, const D: usize>(&self, logits: Tensor<B, D>) -> Tensor<B, D> {
        let logits = match self.clipping {
            Some(c) => logits.tanh().mul_scalar(c),
            None => logits,
        };
        match self.temperature {
            Some(t) => logits.div_scalar(t),
            None => logits,
        }
    }
}
