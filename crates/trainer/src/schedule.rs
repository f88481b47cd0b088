/// Linearly decaying entropy weight.
///
/// The first call to [`next_weight`](Self::next_weight) returns `max`; each
/// following call subtracts `(max - min) / (steps - 1)` until the weight
/// reaches `min`, where it stays.
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyWeightDecay {
    min: f64,
    step_size: f64,
    weight: f64,
}

impl EntropyWeightDecay {
    /// # Panics
    /// Panics if `steps < 2`; configs are validated before this is built.
    pub fn new(max: f64, min: f64, steps: usize) -> Self {
        assert!(steps >= 2, "entropy decay needs at least 2 steps, got {steps}");
        let step_size = (max - min) / (steps - 1) as f64;
        Self {
            min,
            step_size,
            weight: max + step_size,
        }
    }

    /// Weight for the next episode.
    pub fn next_weight(&mut self) -> f64 {
        self.weight = (self.weight - self.step_size).max(self.min);
        self.weight
    }
}
