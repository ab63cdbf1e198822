//! Monte-Carlo expectation with an adaptive stopping rule.

use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::standard_error::StandardError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectationConfig {
    /// Draws outside `[low, high]` count as iterations but contribute zero.
    pub low: f64,
    pub high: f64,
    pub min_iter: usize,
    pub max_iter: usize,
    pub precision: f64,
    /// Compare the error against `precision * max(1, |estimate|)`.
    pub relative: bool,
}

impl Default for ExpectationConfig {
    fn default() -> Self {
        Self {
            low: f64::NEG_INFINITY,
            high: f64::INFINITY,
            min_iter: 100,
            max_iter: 10_000,
            precision: 1e-3,
            relative: false,
        }
    }
}

impl ExpectationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 || self.min_iter > self.max_iter {
            return Err(Error::InvalidConfig(format!(
                "iteration bounds must satisfy min_iter <= max_iter and max_iter > 0, got [{}, {}]",
                self.min_iter, self.max_iter
            )));
        }
        if !(self.precision > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "precision must be positive, got {}",
                self.precision
            )));
        }
        if self.low.is_nan() || self.high.is_nan() || self.low > self.high {
            return Err(Error::InvalidConfig(format!(
                "empty integration range [{}, {}]",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McEstimate {
    pub value: f64,
    pub iterations: usize,
    /// Spread of the running estimate when the loop stopped.
    pub sigma: f64,
}

/// Estimates `E[f(X) 1{low <= X <= high}]` for `X` drawn from `sampler`.
///
/// Every running mean is fed into a [`StandardError`]; the loop stops once
/// `min_iter` draws are done and the spread of those running means is below
/// the requested precision, or after `max_iter` draws.
pub fn expectation_mc<F>(
    mut f: F,
    sampler: &mut dyn Distribution,
    cfg: &ExpectationConfig,
) -> Result<McEstimate>
where
    F: FnMut(f64) -> f64,
{
    cfg.validate()?;
    let mut sum = 0.0;
    let mut result = 0.0;
    let mut err = StandardError::new();
    let mut iterations = 0;
    while iterations < cfg.max_iter {
        let x = sampler.rand();
        if x >= cfg.low && x <= cfg.high {
            sum += f(x);
        }
        iterations += 1;
        result = sum / iterations as f64;
        err.add(result);

        if iterations >= cfg.min_iter {
            let tolerance = if cfg.relative {
                cfg.precision * result.abs().max(1.0)
            } else {
                cfg.precision
            };
            if err.sigma() < tolerance {
                break;
            }
        }
    }
    tracing::debug!(iterations, value = result, sigma = err.sigma(), "expectation estimate");
    Ok(McEstimate {
        value: result,
        iterations,
        sigma: err.sigma(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Normal;

    #[test]
    fn test_density_integrates_to_one() {
        let mut sampler = Normal::new(0.0, 1.0).unwrap().with_seed(7);
        let cfg = ExpectationConfig::default();
        let est = expectation_mc(|_| 1.0, &mut sampler, &cfg).unwrap();
        assert_eq!(est.value, 1.0);
        assert_eq!(est.iterations, cfg.min_iter);
        assert_eq!(est.sigma, 0.0);
    }

    #[test]
    fn test_range_restriction_and_max_iter_cap() {
        let mut sampler = Normal::new(0.0, 1.0).unwrap().with_seed(8);
        let cfg = ExpectationConfig {
            low: 0.0,
            max_iter: 20_000,
            precision: 1e-12,
            ..Default::default()
        };
        let est = expectation_mc(|_| 1.0, &mut sampler, &cfg).unwrap();
        assert_eq!(est.iterations, 20_000);
        assert!((est.value - 0.5).abs() < 0.02, "P(X >= 0) = {}", est.value);
    }

    #[test]
    fn test_relative_precision_stops_early() {
        // Normal with MAD 1 has variance pi/2.
        let mut sampler = Normal::new(0.0, 1.0).unwrap().with_seed(9);
        let cfg = ExpectationConfig {
            max_iter: 200_000,
            precision: 0.05,
            relative: true,
            ..Default::default()
        };
        let est = expectation_mc(|x| x * x, &mut sampler, &cfg).unwrap();
        assert!(est.iterations >= cfg.min_iter);
        assert!(est.iterations < cfg.max_iter);
        assert!(est.sigma < 0.05 * est.value.max(1.0));
        assert!((est.value - std::f64::consts::FRAC_PI_2).abs() < 0.12, "{}", est.value);
    }

    #[test]
    fn test_invalid_config() {
        let mut sampler = Normal::new(0.0, 1.0).unwrap();
        for cfg in [
            ExpectationConfig {
                min_iter: 10,
                max_iter: 5,
                ..Default::default()
            },
            ExpectationConfig {
                min_iter: 0,
                max_iter: 0,
                ..Default::default()
            },
            ExpectationConfig {
                precision: 0.0,
                ..Default::default()
            },
            ExpectationConfig {
                low: 1.0,
                high: -1.0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                expectation_mc(|x| x, &mut sampler, &cfg),
                Err(Error::InvalidConfig(_))
            ));
        }
    }
}
