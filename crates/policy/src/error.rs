/// Errors raised while building a policy or its formula encoding.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    #[error("invalid policy config: {0}")]
    InvalidConfig(String),
    #[error("literal embeddings cover {actual} variables, formula has {expected}")]
    EmbeddingCount { expected: usize, actual: usize },
    #[error("embedding for {literal} has width {actual}, expected {expected}")]
    EmbeddingWidth {
        literal: String,
        expected: usize,
        actual: usize,
    },
    #[error("encoding has {actual}-wide {what} features, policy expects {expected}")]
    FeatureMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}
