//! Engine configuration.
//!
//! These are plain data holders: whoever loads them (CLI flags, a JSON file,
//! a caller building them by hand) is expected to run `validate()` before
//! handing them to the engine, and the engine re-validates anyway.

use serde::{Deserialize, Serialize};

use crate::buckets::Spacing;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketsConfig {
    pub n: usize,
    pub spacing: Spacing,
    pub min: f64,
    pub max: f64,
    /// Derive spacing and range from the data instead of `min`/`max`.
    pub auto_bounds: bool,
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            n: 101,
            spacing: Spacing::Linear,
            min: -1.0,
            max: 1.0,
            auto_bounds: false,
        }
    }
}

/// Settings for batched parallel sampling into a histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelSamplingConfig {
    pub buckets: BucketsConfig,
    /// Total number of output samples.
    pub samples: usize,
    pub batch_min: usize,
    pub batch_max: usize,
    /// Worker threads; 0 means one per available core, 1 runs serially.
    pub workers: usize,
    pub seed: Option<u64>,
    // Importance-sampling bias; derived from the buckets and `n` when unset.
    pub bias_shift: Option<f64>,
    pub bias_scale: Option<f64>,
    pub bias_power: Option<f64>,
}

impl Default for ParallelSamplingConfig {
    fn default() -> Self {
        Self {
            buckets: BucketsConfig::default(),
            samples: 10_000,
            batch_min: 10,
            batch_max: 10_000,
            workers: 0,
            seed: None,
            bias_shift: None,
            bias_scale: None,
            bias_power: None,
        }
    }
}

impl ParallelSamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(Error::InvalidConfig("samples must be positive".into()));
        }
        if self.batch_min == 0 || self.batch_min > self.batch_max {
            return Err(Error::InvalidConfig(format!(
                "batch bounds must satisfy 0 < batch_min <= batch_max, got [{}, {}]",
                self.batch_min, self.batch_max
            )));
        }
        for (name, value) in [("bias_scale", self.bias_scale), ("bias_power", self.bias_power)] {
            if let Some(v) = value {
                if !(v > 0.0 && v.is_finite()) {
                    return Err(Error::InvalidConfig(format!("{name} must be positive, got {v}")));
                }
            }
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn workers(&self) -> usize {
        if self.workers == 0 {
            rayon::current_num_threads().max(1)
        } else {
            self.workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ParallelSamplingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let cfg = ParallelSamplingConfig {
            samples: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_inverted_batch_bounds_rejected() {
        let cfg = ParallelSamplingConfig {
            batch_min: 100,
            batch_max: 10,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_bias_rejected() {
        let cfg = ParallelSamplingConfig {
            bias_power: Some(0.0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_auto_workers() {
        let cfg = ParallelSamplingConfig::default();
        assert!(cfg.workers() >= 1);
        let serial = ParallelSamplingConfig {
            workers: 1,
            ..Default::default()
        };
        assert_eq!(serial.workers(), 1);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "samples": 500,
            "seed": 7,
            "buckets": {"n": 21, "spacing": "symmetric-exponential", "min": 0.01, "max": 1.0}
        }"#;
        let cfg: ParallelSamplingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.samples, 500);
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.buckets.n, 21);
        assert_eq!(cfg.buckets.spacing, Spacing::SymmetricExponential);
        assert_eq!(cfg.batch_max, 10_000);
    }
}
