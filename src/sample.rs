use std::sync::{Arc, OnceLock};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::buckets::Buckets;
use crate::config::BucketsConfig;
use crate::distribution::{Distribution, check_quantile_arg, fork_rng, new_rng};
use crate::error::{Error, Result};
use crate::histogram::Histogram;

/// Empirical distribution over a fixed sample.
/// Data is kept sorted so quantiles are direct lookups and the CDF is a binary search.
/// Density and moments come from a histogram built on first use.
#[derive(Debug, Clone)]
pub struct SampleDistribution {
    data: Arc<[f64]>,
    buckets: Buckets,
    histogram: Arc<OnceLock<Histogram>>,
    rng: Xoshiro256PlusPlus,
}

impl SampleDistribution {
    pub fn new(mut data: Vec<f64>, buckets: &Buckets) -> Self {
        data.sort_by(f64::total_cmp);
        SampleDistribution {
            data: data.into(),
            buckets: buckets.clone(),
            histogram: Arc::new(OnceLock::new()),
            rng: new_rng(None),
        }
    }

    /// Like [`SampleDistribution::new`], with buckets built from `cfg` and
    /// fitted to the data when `cfg.auto_bounds` is set.
    pub fn fitted(mut data: Vec<f64>, cfg: &BucketsConfig) -> Result<Self> {
        data.sort_by(f64::total_cmp);
        let buckets = Buckets::from_config(cfg, Some(&data))?;
        Ok(Self::new(data, &buckets))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed(seed);
        self
    }

    /// The sorted sample.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn histogram(&self) -> &Histogram {
        self.histogram.get_or_init(|| {
            tracing::debug!(
                samples = self.data.len(),
                buckets = self.buckets.n(),
                "building sample histogram"
            );
            let mut h = Histogram::new(&self.buckets);
            h.add_all(self.data.iter().copied());
            h
        })
    }
}

impl Distribution for SampleDistribution {
    /// Bootstrap draw: a uniformly chosen element of the sample.
    fn rand(&mut self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data[self.rng.random_range(0..self.data.len())]
    }

    fn quantile(&self, q: f64) -> f64 {
        check_quantile_arg(q);
        if self.data.is_empty() {
            return 0.0;
        }
        let n = self.data.len();
        let idx = ((q * n as f64) as usize).min(n - 1);
        self.data[idx]
    }

    fn prob(&self, x: f64) -> f64 {
        self.histogram().prob(x)
    }

    fn mean(&self) -> f64 {
        self.histogram().mean()
    }

    fn mad(&self) -> f64 {
        self.histogram().mad()
    }

    fn variance(&self) -> f64 {
        self.histogram().variance()
    }

    fn cdf(&self, x: f64) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.partition_point(|&v| v <= x) as f64 / self.data.len() as f64
    }

    fn copy(&mut self) -> Box<dyn Distribution> {
        let rng = fork_rng(&mut self.rng);
        Box::new(SampleDistribution { rng, ..self.clone() })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    }
}

/// Rescales samples to `(x - mean) / MAD`.
pub fn normalize(samples: &[f64]) -> Result<Vec<f64>> {
    let n = samples.len() as f64;
    let mean = if samples.is_empty() { 0.0 } else { samples.iter().sum::<f64>() / n };
    let mad = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|x| (x - mean).abs()).sum::<f64>() / n
    };
    if mad == 0.0 || !mad.is_finite() {
        return Err(Error::DegenerateMad(mad));
    }
    Ok(samples.iter().map(|x| (x - mean) / mad).collect())
}
