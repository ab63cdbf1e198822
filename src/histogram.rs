use crate::buckets::Buckets;
use crate::error::{Error, Result};
use crate::standard_error::StandardError;

/// Weighted sample counts over a fixed set of [`Buckets`].
///
/// `counts` records how many samples landed in each bucket; `weights` records
/// the probability mass they carry. The two coincide for plain sampling and
/// diverge under importance weighting, where `counts` still tells how well a
/// bucket is supported.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    buckets: Buckets,
    counts: Vec<u64>,
    weights: Vec<f64>,
    sums: Vec<f64>,
    size: f64,
    sum_total: f64,
    std_errors: Option<Vec<StandardError>>,
}

impl Histogram {
    pub fn new(buckets: &Buckets) -> Self {
        let n = buckets.n();
        Histogram {
            buckets: buckets.clone(),
            counts: vec![0; n],
            weights: vec![0.0; n],
            sums: vec![0.0; n],
            size: 0.0,
            sum_total: 0.0,
            std_errors: None,
        }
    }

    /// Enables per-bucket error tracking. Each histogram merged in afterwards
    /// counts as one independent estimate of every bucket's share of mass.
    pub fn with_std_errors(mut self) -> Self {
        self.std_errors = Some(vec![StandardError::new(); self.buckets.n()]);
        self
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn sums(&self) -> &[f64] {
        &self.sums
    }

    /// Total weight.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Total number of samples added, regardless of weight.
    pub fn count_total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn std_errors(&self) -> Option<&[StandardError]> {
        self.std_errors.as_deref()
    }

    /// Standard error of bucket `i`'s share of the total mass, if tracked.
    pub fn std_error(&self, i: usize) -> Option<f64> {
        self.std_errors.as_ref()?.get(i).map(StandardError::std_error)
    }

    pub fn add(&mut self, x: f64) {
        self.add_with_weight(x, 1.0);
    }

    pub fn add_all(&mut self, xs: impl IntoIterator<Item = f64>) {
        for x in xs {
            self.add(x);
        }
    }

    pub fn add_with_weight(&mut self, x: f64, w: f64) {
        let i = self.buckets.bucket(x);
        self.counts[i] += 1;
        self.weights[i] += w;
        self.sums[i] += w * x;
        self.size += w;
        self.sum_total += w * x;
    }

    /// Adds `weights[i]` to bucket `i` as if its midpoint had been sampled
    /// with that weight. Sample counts are left alone.
    pub fn add_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.buckets.n() {
            return Err(Error::LengthMismatch {
                expected: self.buckets.n(),
                actual: weights.len(),
            });
        }
        for (i, &w) in weights.iter().enumerate() {
            let x = self.buckets.x(i, 0.5);
            self.weights[i] += w;
            self.sums[i] += w * x;
            self.size += w;
            self.sum_total += w * x;
        }
        Ok(())
    }

    /// Merges `other` into `self`. Buckets must be identical.
    ///
    /// When errors are tracked, an `other` that tracks errors itself is
    /// merged error for error. Otherwise `other` counts as one batch: each
    /// bucket's error gets one sample, that bucket's share of `other`'s
    /// weight. Every batch counts the same regardless of its size, so a small
    /// trailing batch adds as much spread as a full one.
    pub fn add_histogram(&mut self, other: &Histogram) -> Result<()> {
        if self.buckets != other.buckets {
            return Err(Error::IncompatibleBuckets);
        }
        if let Some(errs) = self.std_errors.as_mut() {
            match other.std_errors.as_ref() {
                Some(theirs) if theirs.iter().any(|e| e.n() > 0) => {
                    errs.iter_mut().zip(theirs).for_each(|(e, t)| e.merge(t));
                }
                _ if other.size > 0.0 => {
                    for (e, w) in errs.iter_mut().zip(&other.weights) {
                        e.add(w / other.size);
                    }
                }
                _ => errs.iter_mut().for_each(|e| e.add_zeros(1)),
            }
        }
        for i in 0..self.buckets.n() {
            self.counts[i] += other.counts[i];
            self.weights[i] += other.weights[i];
            self.sums[i] += other.sums[i];
        }
        self.size += other.size;
        self.sum_total += other.sum_total;
        Ok(())
    }

    /// Representative value of bucket `i`: the weighted mean of its samples,
    /// or the bucket midpoint when it is empty.
    pub fn x(&self, i: usize) -> f64 {
        if self.weights[i] != 0.0 {
            self.sums[i] / self.weights[i]
        } else {
            self.buckets.x(i, 0.5)
        }
    }

    pub fn mean(&self) -> f64 {
        if self.size == 0.0 {
            return 0.0;
        }
        self.sum_total / self.size
    }

    /// Mean absolute deviation, approximated from bucket values.
    pub fn mad(&self) -> f64 {
        self.weighted_deviation(|d| d.abs())
    }

    pub fn variance(&self) -> f64 {
        self.weighted_deviation(|d| d * d)
    }

    pub fn sigma(&self) -> f64 {
        self.variance().sqrt()
    }

    fn weighted_deviation(&self, f: impl Fn(f64) -> f64) -> f64 {
        if self.size == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let total: f64 = (0..self.buckets.n())
            .map(|i| self.weights[i] * f(self.x(i) - mean))
            .sum();
        total / self.size
    }

    /// Value below which a `q` share of the weight lies.
    ///
    /// # Panics
    ///
    /// Panics if `q` is outside `[0, 1]`.
    pub fn quantile(&self, q: f64) -> f64 {
        assert!((0.0..=1.0).contains(&q), "quantile argument must be in [0, 1], got {q}");
        if self.size <= 0.0 {
            return self.buckets.lower();
        }
        let target = q * self.size;
        let bounds = self.buckets.bounds();
        let mut acc = 0.0;
        for (i, &w) in self.weights.iter().enumerate() {
            if w > 0.0 && acc + w >= target {
                let frac = ((target - acc) / w).clamp(0.0, 1.0);
                return bounds[i] + frac * self.buckets.size(i);
            }
            acc += w;
        }
        self.buckets.upper()
    }

    /// Share of weight at or below `x`, interpolating linearly inside a bucket.
    pub fn cdf(&self, x: f64) -> f64 {
        if self.size <= 0.0 || x <= self.buckets.lower() {
            return 0.0;
        }
        if x >= self.buckets.upper() {
            return 1.0;
        }
        let i = self.buckets.bucket(x);
        let below: f64 = self.weights[..i].iter().sum();
        let frac = (x - self.buckets.bounds()[i]) / self.buckets.size(i);
        ((below + frac * self.weights[i]) / self.size).clamp(0.0, 1.0)
    }

    /// Density of bucket `i`: its share of the weight over its width.
    pub fn pdf(&self, i: usize) -> f64 {
        if self.size <= 0.0 || i >= self.buckets.n() {
            return 0.0;
        }
        self.weights[i] / self.size / self.buckets.size(i)
    }

    /// Density at `x`, linearly interpolated between neighbouring bucket
    /// midpoints. Zero outside the buckets' range.
    pub fn prob(&self, x: f64) -> f64 {
        if x < self.buckets.lower() || x > self.buckets.upper() {
            return 0.0;
        }
        let i = self.buckets.bucket(x);
        let center = self.buckets.x(i, 0.5);
        let (lo, hi) = if x < center {
            if i == 0 {
                return self.pdf(0);
            }
            (i - 1, i)
        } else {
            if i + 1 == self.buckets.n() {
                return self.pdf(i);
            }
            (i, i + 1)
        };
        let (x_lo, x_hi) = (self.buckets.x(lo, 0.5), self.buckets.x(hi, 0.5));
        let t = (x - x_lo) / (x_hi - x_lo);
        self.pdf(lo) * (1.0 - t) + self.pdf(hi) * t
    }
}
