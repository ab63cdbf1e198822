use std::sync::Arc;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::distribution::{Distribution, fork_rng, new_rng, uniform};
use crate::histogram::Histogram;

/// Distribution backed by a shared, read-only histogram.
///
/// Copies share the same `Arc<Histogram>`; only the random stream is
/// duplicated. Sampling inverts the histogram's CDF.
#[derive(Debug, Clone)]
pub struct HistogramDistribution {
    histogram: Arc<Histogram>,
    rng: Xoshiro256PlusPlus,
}

impl HistogramDistribution {
    pub fn new(histogram: Arc<Histogram>) -> Self {
        HistogramDistribution {
            histogram,
            rng: new_rng(None),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed(seed);
        self
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }
}

impl Distribution for HistogramDistribution {
    fn rand(&mut self) -> f64 {
        self.histogram.quantile(uniform(&mut self.rng))
    }

    fn quantile(&self, q: f64) -> f64 {
        self.histogram.quantile(q)
    }

    fn prob(&self, x: f64) -> f64 {
        self.histogram.prob(x)
    }

    fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    fn mad(&self) -> f64 {
        self.histogram.mad()
    }

    fn variance(&self) -> f64 {
        self.histogram.variance()
    }

    fn cdf(&self, x: f64) -> f64 {
        self.histogram.cdf(x)
    }

    fn copy(&mut self) -> Box<dyn Distribution> {
        let rng = fork_rng(&mut self.rng);
        Box::new(HistogramDistribution {
            histogram: Arc::clone(&self.histogram),
            rng,
        })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    }
}
