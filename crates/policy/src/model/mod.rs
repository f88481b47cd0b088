//! Trainable assignment policy: shared input embedding, recurrent cells and
//! the causal transformer decoder.

pub mod cells;
pub mod sat_policy;
