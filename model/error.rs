use crate::estimate::EstimateError;
use crate::space::Space;
use thiserror::Error;

/// Errors surfaced by the model. Every contract violation is reported to the
/// caller at the point it is detected; nothing is retried or coerced.
#[derive(Error, Debug)]
pub enum PldaError {
    /// Invalid or conflicting fit options, unknown space names, or
    /// parameter sets that break the model invariants.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input for space {space} has trailing dimension {found}, expected {expected}.")]
    Shape {
        space: Space,
        expected: usize,
        found: usize,
    },

    #[error("Expected a single vector or a 2-D batch, got an array with {0} axes.")]
    Rank(usize),

    #[error("Got {labels} labels for {samples} samples.")]
    LabelCount { samples: usize, labels: usize },

    #[error("No posterior parameters for category {0}.")]
    UnknownCategory(String),

    #[error("The model has not been fit.")]
    NotFitted,

    #[error("Estimation failed: {0}")]
    Estimation(#[from] EstimateError),
}
