// Error type for the simulation engine.
//
// Operators fail only when a probability that reaches the binomial sampler or
// its expected-value counterpart is not a valid probability (NaN or outside
// [0, 1] after clamping, which can only come from NaN/infinite inputs), or
// when a deterministic computation meets a non-finite count. Out-of-range probabilities produced
// by the transition builder are clamped silently and never reach this type.
// The remaining variants are raised by kernel construction and by
// `Scenario::validate()` / `Scenario::load()` in `config.rs`.

use thiserror::Error;

/// Errors emitted by the simulation engine and its configuration layer.
#[derive(Debug, Error)]
pub enum SimError {
    /// A binomial draw was requested with a probability outside [0, 1].
    #[error("invalid binomial probability {value}")]
    InvalidProbability { value: f64 },

    /// An expected-value computation met a NaN or infinite count.
    #[error("invalid count {value}")]
    InvalidCount { value: f64 },

    /// The neighborhood kernel is not a square matrix with an odd side.
    #[error("neighborhood kernel must be square with an odd side, got {rows}x{cols}")]
    KernelShape { rows: usize, cols: usize },

    /// Two arrays that must agree in some dimension do not.
    #[error("{what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// A time-varying environment series has fewer frames than steps.
    #[error("environment series has {available} frames but the run needs {needed}")]
    EnvironmentTooShort { needed: usize, available: usize },

    /// A stage index refers past the last stage.
    #[error("{what} stage {stage} out of range for {stages} stages")]
    StageOutOfRange {
        what: &'static str,
        stage: usize,
        stages: usize,
    },

    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Json(#[from] serde_json::Error),
}
