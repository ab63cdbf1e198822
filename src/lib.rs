//! Histogram-backed probability distributions, Monte-Carlo expectations and
//! n-fold compounding of i.i.d. variables, sampled in parallel batches.

pub mod buckets;
pub mod compound;
pub mod config;
pub mod distribution;
pub mod error;
pub mod formatting;
pub mod histogram;
pub mod histogram_distribution;
pub mod montecarlo;
pub mod parallel;
pub mod parsing;
pub mod rand_distribution;
pub mod sample;
pub mod standard_error;

pub use buckets::{Buckets, Spacing};
pub use compound::{VariableSubstitution, compound_histogram};
pub use config::{BucketsConfig, ParallelSamplingConfig};
pub use distribution::{Distribution, Normal, StudentsT};
pub use error::{Error, Result};
pub use histogram::Histogram;
pub use histogram_distribution::HistogramDistribution;
pub use montecarlo::{ExpectationConfig, McEstimate, expectation_mc};
pub use rand_distribution::{
    Compound, FastCompound, RandDistribution, Transform, compound_rand_distribution,
    fast_compound_rand_distribution,
};
pub use sample::{SampleDistribution, normalize};
pub use standard_error::StandardError;
