use crate::buckets::Spacing;

/// Errors returned by engine constructors, merges and samplers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("number of buckets must be positive")]
    NoBuckets,

    #[error("min ({min}) must be less than max ({max})")]
    EmptyRange { min: f64, max: f64 },

    #[error("{spacing:?} spacing requires min > 0, got {min}")]
    NonPositiveMin { spacing: Spacing, min: f64 },

    #[error("symmetric exponential spacing requires an odd number of buckets >= 3, got {0}")]
    EvenBuckets(usize),

    #[error("expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("cannot merge histograms with different buckets")]
    IncompatibleBuckets,

    #[error("transform produced NaN")]
    NotANumber,

    #[error("cannot normalize by MAD = {0}")]
    DegenerateMad(f64),

    #[error("invalid distribution parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

pub type Result<T> = std::result::Result<T, Error>;
