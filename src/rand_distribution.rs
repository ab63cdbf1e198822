//! Distributions defined by transforming draws from another distribution.
//!
//! A [`RandDistribution`] can always be sampled directly. Its statistics come
//! from a histogram that is sampled once, in parallel, the first time any of
//! them is requested, and shared with every copy afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::buckets::Buckets;
use crate::config::ParallelSamplingConfig;
use crate::distribution::{Distribution, check_quantile_arg};
use crate::error::{Error, Result};
use crate::histogram::Histogram;
use crate::parallel::{self, Batch};

/// A stateful map from source draws to output samples.
///
/// Each sampling batch starts from `init_state()` and threads the state
/// through successive `step` calls, so a transform may reuse work between
/// consecutive outputs.
pub trait Transform: Send + Sync + 'static {
    type State: Send;

    fn init_state(&self) -> Self::State;

    fn step(&self, source: &mut dyn Distribution, state: &mut Self::State) -> f64;
}

/// Output of a [`Transform`] applied to a source distribution.
pub struct RandDistribution<T: Transform> {
    // Locked only to fork per-batch copies and to draw in `rand`.
    source: Mutex<Box<dyn Distribution>>,
    transform: Arc<T>,
    config: ParallelSamplingConfig,
    buckets: Buckets,
    histogram: Arc<OnceLock<Result<Histogram>>>,
}

impl<T: Transform> RandDistribution<T> {
    /// Wraps a copy of `source`. When `config.seed` is set the copy is
    /// reseeded with it, making the cached histogram reproducible.
    pub fn new(
        source: &mut dyn Distribution,
        transform: T,
        config: &ParallelSamplingConfig,
    ) -> Result<Self> {
        config.validate()?;
        let buckets = Buckets::from_config(&config.buckets, None)?;
        let mut source = source.copy();
        if let Some(seed) = config.seed {
            source.seed(seed);
        }
        Ok(RandDistribution {
            source: Mutex::new(source),
            transform: Arc::new(transform),
            config: config.clone(),
            buckets,
            histogram: Arc::new(OnceLock::new()),
        })
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// The sampled histogram, built on first call.
    pub fn histogram(&self) -> Result<&Histogram> {
        self.histogram
            .get_or_init(|| self.build_histogram())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn build_histogram(&self) -> Result<Histogram> {
        tracing::debug!(samples = self.config.samples, "sampling transformed distribution");
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        let transform = Arc::clone(&self.transform);
        let result = parallel::sample_histogram(
            &mut **source,
            &self.config,
            &self.buckets,
            false,
            move |job, buckets| {
                let Batch { mut source, samples, .. } = job;
                let mut state = transform.init_state();
                let mut h = Histogram::new(buckets);
                for _ in 0..samples {
                    let x = transform.step(source.as_mut(), &mut state);
                    if x.is_nan() {
                        return Err(Error::NotANumber);
                    }
                    h.add(x);
                }
                Ok(h)
            },
        );
        if let Err(e) = &result {
            tracing::error!(error = %e, "failed to sample transformed distribution");
        }
        result
    }

    fn stat(&self, f: impl FnOnce(&Histogram) -> f64) -> f64 {
        self.histogram().map_or(f64::NAN, f)
    }
}

/// Statistics are NaN if the histogram could not be built; call
/// [`RandDistribution::histogram`] for the error.
impl<T: Transform> Distribution for RandDistribution<T> {
    fn rand(&mut self) -> f64 {
        let source = self.source.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.transform.init_state();
        self.transform.step(source.as_mut(), &mut state)
    }

    fn quantile(&self, q: f64) -> f64 {
        check_quantile_arg(q);
        self.stat(|h| h.quantile(q))
    }

    fn prob(&self, x: f64) -> f64 {
        self.stat(|h| h.prob(x))
    }

    fn mean(&self) -> f64 {
        self.stat(Histogram::mean)
    }

    fn mad(&self) -> f64 {
        self.stat(Histogram::mad)
    }

    fn variance(&self) -> f64 {
        self.stat(Histogram::variance)
    }

    fn cdf(&self, x: f64) -> f64 {
        self.stat(|h| h.cdf(x))
    }

    fn copy(&mut self) -> Box<dyn Distribution> {
        let source = self
            .source
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .copy();
        Box::new(RandDistribution {
            source: Mutex::new(source),
            transform: Arc::clone(&self.transform),
            config: self.config.clone(),
            buckets: self.buckets.clone(),
            histogram: Arc::clone(&self.histogram),
        })
    }

    /// Reseeds the source. A histogram that was already built is kept.
    fn seed(&mut self, seed: u64) {
        self.source
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .seed(seed);
    }
}

/// Sum of `n` fresh source draws per output sample.
#[derive(Debug, Clone, Copy)]
pub struct Compound {
    n: usize,
}

impl Transform for Compound {
    type State = ();

    fn init_state(&self) -> Self::State {}

    fn step(&self, source: &mut dyn Distribution, _: &mut ()) -> f64 {
        (0..self.n).map(|_| source.rand()).sum()
    }
}

/// Sum over a window of the last `n` source draws, advanced by one draw per
/// output sample.
///
/// Consecutive outputs overlap in `n - 1` draws, so they are correlated;
/// the histogram of many outputs still converges to the n-fold compound as
/// long as the source is stationary and i.i.d.
#[derive(Debug, Clone, Copy)]
pub struct FastCompound {
    n: usize,
}

#[derive(Debug, Default)]
pub struct Window {
    draws: VecDeque<f64>,
    sum: f64,
    since_resum: usize,
}

impl Transform for FastCompound {
    type State = Window;

    fn init_state(&self) -> Window {
        Window {
            draws: VecDeque::with_capacity(self.n),
            ..Default::default()
        }
    }

    fn step(&self, source: &mut dyn Distribution, w: &mut Window) -> f64 {
        if w.draws.is_empty() {
            w.draws.extend((0..self.n).map(|_| source.rand()));
            w.sum = w.draws.iter().sum();
            return w.sum;
        }
        let x = source.rand();
        let old = w.draws.pop_front().unwrap_or(0.0);
        w.draws.push_back(x);
        w.since_resum += 1;
        // Re-add from scratch every n steps so rounding does not accumulate.
        if w.since_resum >= self.n {
            w.sum = w.draws.iter().sum();
            w.since_resum = 0;
        } else {
            w.sum += x - old;
        }
        w.sum
    }
}

fn check_compound_n(n: usize) -> Result<()> {
    if n == 0 {
        return Err(Error::InvalidParameters("compound count must be positive".into()));
    }
    Ok(())
}

/// Distribution of the sum of `n` independent draws from `source`.
pub fn compound_rand_distribution(
    source: &mut dyn Distribution,
    n: usize,
    config: &ParallelSamplingConfig,
) -> Result<RandDistribution<Compound>> {
    check_compound_n(n)?;
    RandDistribution::new(source, Compound { n }, config)
}

/// Same distribution as [`compound_rand_distribution`], sampled with a
/// sliding window: O(n + m) source draws for m samples instead of O(n·m).
pub fn fast_compound_rand_distribution(
    source: &mut dyn Distribution,
    n: usize,
    config: &ParallelSamplingConfig,
) -> Result<RandDistribution<FastCompound>> {
    check_compound_n(n)?;
    RandDistribution::new(source, FastCompound { n }, config)
}
