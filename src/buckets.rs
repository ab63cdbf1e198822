use serde::{Deserialize, Serialize};

use crate::config::BucketsConfig;
use crate::error::{Error, Result};

/// How bucket boundaries are laid out between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Spacing {
    #[default]
    Linear,
    /// Equal widths in log10 space over `[min, max]`, `min > 0`.
    Exponential,
    /// A central cell `[-min, min]` with exponential cells mirrored on each
    /// side out to `±max`. Needs an odd number of buckets.
    SymmetricExponential,
}

/// Partition of a real interval into `n` ordered cells.
///
/// Fields are private so that `bounds` can never drift from the parameters
/// that define it; every change goes through [`Buckets::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets {
    n: usize,
    spacing: Spacing,
    min: f64,
    max: f64,
    bounds: Vec<f64>,
}

impl Buckets {
    pub fn new(n: usize, min: f64, max: f64, spacing: Spacing) -> Result<Self> {
        if n == 0 {
            return Err(Error::NoBuckets);
        }
        if !(min < max) || !min.is_finite() || !max.is_finite() {
            return Err(Error::EmptyRange { min, max });
        }
        if spacing != Spacing::Linear && min <= 0.0 {
            return Err(Error::NonPositiveMin { spacing, min });
        }
        if spacing == Spacing::SymmetricExponential && (n < 3 || n % 2 == 0) {
            return Err(Error::EvenBuckets(n));
        }

        let mut buckets = Buckets {
            n,
            spacing,
            min,
            max,
            bounds: Vec::with_capacity(n + 1),
        };
        buckets.bounds = (0..=n).map(|i| buckets.x(i, 0.0)).collect();
        // Pin the outer edges so saturation checks compare against the exact range.
        match spacing {
            Spacing::SymmetricExponential => {
                buckets.bounds[0] = -max;
                buckets.bounds[n] = max;
            }
            _ => {
                buckets.bounds[0] = min;
                buckets.bounds[n] = max;
            }
        }
        Ok(buckets)
    }

    /// Builds buckets from config, fitting them to `data` (sorted) when
    /// `auto_bounds` is set. Auto bounds without data to fit is an error;
    /// an empty sample keeps the configured range.
    pub fn from_config(cfg: &BucketsConfig, data: Option<&[f64]>) -> Result<Self> {
        match data {
            None if cfg.auto_bounds => Err(Error::InvalidConfig(
                "auto_bounds requires data to fit the buckets to".into(),
            )),
            Some(sorted) if cfg.auto_bounds && !sorted.is_empty() => {
                let mut buckets = Buckets {
                    n: cfg.n,
                    spacing: cfg.spacing,
                    min: cfg.min,
                    max: cfg.max,
                    bounds: Vec::new(),
                };
                buckets.fit_to(sorted)?;
                Ok(buckets)
            }
            _ => Buckets::new(cfg.n, cfg.min, cfg.max, cfg.spacing),
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// The `n + 1` ascending cell boundaries.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Lowest covered value.
    pub fn lower(&self) -> f64 {
        self.bounds[0]
    }

    /// Highest covered value.
    pub fn upper(&self) -> f64 {
        self.bounds[self.n]
    }

    /// Value inside cell `i`, `shift` of the way toward its upper boundary.
    /// `x(i, 0.0)` is the lower boundary; `x(n, 0.0)` is the top of the range.
    pub fn x(&self, i: usize, shift: f64) -> f64 {
        let pos = i as f64 + shift;
        match self.spacing {
            Spacing::Linear => self.min + pos * (self.max - self.min) / self.n as f64,
            Spacing::Exponential => {
                let (lmin, lmax) = (self.min.log10(), self.max.log10());
                10f64.powf(lmin + pos * (lmax - lmin) / self.n as f64)
            }
            Spacing::SymmetricExponential => {
                let k = (self.n - 1) / 2;
                if i == k {
                    -self.min + 2.0 * self.min * shift
                } else if i > k {
                    self.side_x((i - k - 1) as f64 + shift)
                } else {
                    -self.side_x((k - i) as f64 - shift)
                }
            }
        }
    }

    // Position along one exponential side, 0 at `min` and `k` at `max`.
    fn side_x(&self, pos: f64) -> f64 {
        let k = ((self.n - 1) / 2) as f64;
        let (lmin, lmax) = (self.min.log10(), self.max.log10());
        10f64.powf(lmin + pos * (lmax - lmin) / k)
    }

    /// Index of the cell containing `x`, saturating at both ends.
    pub fn bucket(&self, x: f64) -> usize {
        let above = self.bounds.partition_point(|&b| b <= x);
        above.saturating_sub(1).min(self.n - 1)
    }

    /// Width of cell `i`; 0 outside the range.
    pub fn size(&self, i: usize) -> f64 {
        if i >= self.n {
            return 0.0;
        }
        self.bounds[i + 1] - self.bounds[i]
    }

    /// Re-derives spacing, min and max from sorted data, keeping `n`.
    ///
    /// The configured spacing is the most elaborate one allowed. Exponential
    /// falls back to linear unless all values are positive; symmetric
    /// exponential becomes exponential for all-positive data, and linear when
    /// there are fewer than two distinct non-zero magnitudes or `n` is not odd.
    pub fn fit_to(&mut self, sorted: &[f64]) -> Result<()> {
        let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
            return Ok(());
        };
        if !first.is_finite() || !last.is_finite() {
            return Err(Error::InvalidParameters(format!(
                "cannot fit buckets to non-finite data range [{first}, {last}]"
            )));
        }

        let exponential = first > 0.0 && first < last;
        let (spacing, min, max) = match self.spacing {
            Spacing::Exponential | Spacing::SymmetricExponential if exponential => {
                (Spacing::Exponential, first, last)
            }
            Spacing::SymmetricExponential if first <= 0.0 && self.n >= 3 && self.n % 2 == 1 => {
                let smallest = sorted
                    .iter()
                    .filter(|&&x| x != 0.0)
                    .map(|x| x.abs())
                    .fold(f64::INFINITY, f64::min);
                let largest = first.abs().max(last.abs());
                if smallest < largest {
                    (Spacing::SymmetricExponential, smallest, largest)
                } else {
                    linear_range(first, last)
                }
            }
            _ => linear_range(first, last),
        };

        *self = Buckets::new(self.n, min, max, spacing)?;
        Ok(())
    }
}

fn linear_range(first: f64, last: f64) -> (Spacing, f64, f64) {
    if first < last {
        (Spacing::Linear, first, last)
    } else {
        let half = first.abs().max(1.0) * 0.5;
        (Spacing::Linear, first - half, last + half)
    }
}
