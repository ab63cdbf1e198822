//! The `Distribution` capability set and its analytic implementations.
//!
//! Analytic distributions here are parameterized by location and mean
//! absolute deviation (MAD) rather than by standard deviation: MAD stays
//! finite and estimable for the heavy-tailed data these models describe.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use statrs::distribution::{Continuous, ContinuousCDF};
use statrs::function::gamma::ln_gamma;

use crate::error::{Error, Result};

/// A univariate distribution that can be sampled and queried.
///
/// Every implementation owns its random stream. [`Distribution::copy`] must
/// return a value whose stream is independent of `self`: parallel sampling
/// hands one copy to each worker, and two workers drawing from the same
/// stream would silently correlate their batches.
pub trait Distribution: Send + Sync {
    /// Draws one sample.
    fn rand(&mut self) -> f64;

    /// Inverse CDF. Panics if `q` is outside `[0, 1]`.
    fn quantile(&self, q: f64) -> f64;

    /// Probability density at `x`.
    fn prob(&self, x: f64) -> f64;

    fn mean(&self) -> f64;

    /// Mean absolute deviation from the mean.
    fn mad(&self) -> f64;

    fn variance(&self) -> f64;

    fn sigma(&self) -> f64 {
        self.variance().sqrt()
    }

    fn cdf(&self, x: f64) -> f64;

    /// Returns a copy with its own random stream. Forking advances `self`'s
    /// stream, so copies made after seeding are reproducible.
    fn copy(&mut self) -> Box<dyn Distribution>;

    /// Restarts the random stream from `seed`.
    fn seed(&mut self, seed: u64);
}

/// A fresh stream, seeded from `seed` or from the thread RNG.
pub(crate) fn new_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed.unwrap_or_else(rand::random))
}

/// Splits off a stream that does not overlap `rng` for the next 2^128 draws.
pub(crate) fn fork_rng(rng: &mut Xoshiro256PlusPlus) -> Xoshiro256PlusPlus {
    let child = rng.clone();
    rng.jump();
    child
}

/// Uniform sample in `[0, 1)`.
pub(crate) fn uniform(rng: &mut Xoshiro256PlusPlus) -> f64 {
    rng.random::<f64>()
}

pub(crate) fn check_quantile_arg(q: f64) {
    assert!((0.0..=1.0).contains(&q), "quantile argument must be in [0, 1], got {q}");
}

fn check_location_mad(mu: f64, mad: f64) -> Result<()> {
    if !mu.is_finite() {
        return Err(Error::InvalidParameters(format!("location must be finite, got {mu}")));
    }
    if !(mad > 0.0 && mad.is_finite()) {
        return Err(Error::InvalidParameters(format!("MAD must be positive, got {mad}")));
    }
    Ok(())
}

/// Gaussian distribution with mean `mu` and mean absolute deviation `mad`.
#[derive(Debug, Clone)]
pub struct Normal {
    mu: f64,
    mad: f64,
    sigma: f64,
    sampler: rand_distr::Normal<f64>,
    analytic: statrs::distribution::Normal,
    rng: Xoshiro256PlusPlus,
}

impl Normal {
    pub fn new(mu: f64, mad: f64) -> Result<Self> {
        check_location_mad(mu, mad)?;
        // MAD = sigma * sqrt(2/pi)
        let sigma = mad * (PI / 2.0).sqrt();
        let sampler = rand_distr::Normal::new(mu, sigma)
            .map_err(|e| Error::InvalidParameters(e.to_string()))?;
        let analytic = statrs::distribution::Normal::new(mu, sigma)
            .map_err(|e| Error::InvalidParameters(e.to_string()))?;
        Ok(Normal {
            mu,
            mad,
            sigma,
            sampler,
            analytic,
            rng: new_rng(None),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed(seed);
        self
    }
}

impl Distribution for Normal {
    fn rand(&mut self) -> f64 {
        rand_distr::Distribution::sample(&self.sampler, &mut self.rng)
    }

    fn quantile(&self, q: f64) -> f64 {
        check_quantile_arg(q);
        self.analytic.inverse_cdf(q)
    }

    fn prob(&self, x: f64) -> f64 {
        self.analytic.pdf(x)
    }

    fn mean(&self) -> f64 {
        self.mu
    }

    fn mad(&self) -> f64 {
        self.mad
    }

    fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    fn cdf(&self, x: f64) -> f64 {
        self.analytic.cdf(x)
    }

    fn copy(&mut self) -> Box<dyn Distribution> {
        let rng = fork_rng(&mut self.rng);
        Box::new(Normal { rng, ..self.clone() })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    }
}

/// Student's t distribution with `alpha` degrees of freedom, location `mu`
/// and mean absolute deviation `mad`. Requires `alpha > 1` so that MAD exists.
#[derive(Debug, Clone)]
pub struct StudentsT {
    alpha: f64,
    mu: f64,
    mad: f64,
    scale: f64,
    sampler: rand_distr::StudentT<f64>,
    analytic: statrs::distribution::StudentsT,
    rng: Xoshiro256PlusPlus,
}

impl StudentsT {
    pub fn new(alpha: f64, mu: f64, mad: f64) -> Result<Self> {
        if !(alpha > 1.0) || alpha.is_nan() {
            return Err(Error::InvalidParameters(format!(
                "degrees of freedom must be > 1 for a finite MAD, got {alpha}"
            )));
        }
        check_location_mad(mu, mad)?;
        let scale = mad / students_t_mad_ratio(alpha);
        let sampler = rand_distr::StudentT::new(alpha)
            .map_err(|e| Error::InvalidParameters(e.to_string()))?;
        let analytic = statrs::distribution::StudentsT::new(mu, scale, alpha)
            .map_err(|e| Error::InvalidParameters(e.to_string()))?;
        Ok(StudentsT {
            alpha,
            mu,
            mad,
            scale,
            sampler,
            analytic,
            rng: new_rng(None),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed(seed);
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// MAD of a standard (unit-scale) Student's t:
/// `2 sqrt(a) G((a+1)/2) / (sqrt(pi) (a-1) G(a/2))`.
fn students_t_mad_ratio(alpha: f64) -> f64 {
    let gamma_ratio = (ln_gamma((alpha + 1.0) / 2.0) - ln_gamma(alpha / 2.0)).exp();
    2.0 * alpha.sqrt() * gamma_ratio / (PI.sqrt() * (alpha - 1.0))
}

impl Distribution for StudentsT {
    fn rand(&mut self) -> f64 {
        let t = rand_distr::Distribution::sample(&self.sampler, &mut self.rng);
        self.mu + self.scale * t
    }

    fn quantile(&self, q: f64) -> f64 {
        check_quantile_arg(q);
        self.analytic.inverse_cdf(q)
    }

    fn prob(&self, x: f64) -> f64 {
        self.analytic.pdf(x)
    }

    fn mean(&self) -> f64 {
        self.mu
    }

    fn mad(&self) -> f64 {
        self.mad
    }

    fn variance(&self) -> f64 {
        if self.alpha > 2.0 {
            self.scale * self.scale * self.alpha / (self.alpha - 2.0)
        } else {
            f64::INFINITY
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        self.analytic.cdf(x)
    }

    fn copy(&mut self) -> Box<dyn Distribution> {
        let rng = fork_rng(&mut self.rng);
        Box::new(StudentsT { rng, ..self.clone() })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} != {b} (tol {tol})");
    }

    fn draw(d: &mut dyn Distribution, n: usize) -> Vec<f64> {
        (0..n).map(|_| d.rand()).collect()
    }

    fn sample_mean_mad(xs: &[f64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let mad = xs.iter().map(|x| (x - mean).abs()).sum::<f64>() / n;
        (mean, mad)
    }

    #[test]
    fn test_normal_moments() {
        let d = Normal::new(2.0, 3.0).unwrap();
        assert_eq!(d.mean(), 2.0);
        assert_eq!(d.mad(), 3.0);
        assert_close(d.sigma(), 3.0 * (PI / 2.0).sqrt(), 1e-12);
        assert_close(d.cdf(2.0), 0.5, 1e-12);
        assert_close(d.quantile(0.5), 2.0, 1e-9);
        assert_close(d.quantile(0.975), 2.0 + 1.959964 * d.sigma(), 1e-4);
        assert_close(d.prob(2.0), 1.0 / (d.sigma() * (2.0 * PI).sqrt()), 1e-12);
    }

    #[test]
    fn test_normal_sampling_matches_parameters() {
        let mut d = Normal::new(-1.0, 0.5).unwrap().with_seed(42);
        let xs = draw(&mut d, 100_000);
        let (mean, mad) = sample_mean_mad(&xs);
        assert_close(mean, -1.0, 0.01);
        assert_close(mad, 0.5, 0.01);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(Normal::new(0.0, 0.0), Err(Error::InvalidParameters(_))));
        assert!(matches!(Normal::new(f64::NAN, 1.0), Err(Error::InvalidParameters(_))));
        assert!(StudentsT::new(1.0, 0.0, 1.0).is_err());
        assert!(StudentsT::new(3.0, 0.0, -1.0).is_err());
    }

    #[test]
    #[should_panic(expected = "quantile argument")]
    fn test_normal_quantile_contract() {
        Normal::new(0.0, 1.0).unwrap().quantile(-0.1);
    }

    #[test]
    fn test_copy_has_independent_stream() {
        let mut parent = Normal::new(0.0, 1.0).unwrap().with_seed(7);
        let mut a = parent.copy();
        let mut b = parent.copy();
        let xs = draw(a.as_mut(), 16);
        let ys = draw(b.as_mut(), 16);
        let zs = draw(&mut parent, 16);
        assert_ne!(xs, ys);
        assert_ne!(xs, zs);
        assert_ne!(ys, zs);
    }

    #[test]
    fn test_copy_is_reproducible_after_seed() {
        let mut parent = Normal::new(0.0, 1.0).unwrap();
        parent.seed(99);
        let first = draw(parent.copy().as_mut(), 8);
        parent.seed(99);
        let again = draw(parent.copy().as_mut(), 8);
        assert_eq!(first, again);
    }

    #[test]
    fn test_students_t_mad_ratio_approaches_normal() {
        assert_close(students_t_mad_ratio(1e6), (2.0 / PI).sqrt(), 1e-5);
        // G(3/2) = sqrt(pi)/2, so a standard t_2 has MAD sqrt(2).
        assert_close(students_t_mad_ratio(2.0), 2f64.sqrt(), 1e-12);
    }

    #[test]
    fn test_students_t_sampling_matches_mad() {
        let mut d = StudentsT::new(4.0, 1.0, 0.2).unwrap().with_seed(3);
        let xs = draw(&mut d, 200_000);
        let (mean, mad) = sample_mean_mad(&xs);
        assert_close(mean, 1.0, 0.01);
        assert_close(mad, 0.2, 0.006);
        assert_close(d.variance(), d.scale() * d.scale() * 2.0, 1e-12);
    }

    #[test]
    fn test_students_t_cdf_quantile() {
        let d = StudentsT::new(3.0, 0.5, 1.0).unwrap();
        assert_close(d.cdf(0.5), 0.5, 1e-9);
        for q in [0.05, 0.3, 0.5, 0.9] {
            assert_close(d.cdf(d.quantile(q)), q, 1e-6);
        }
        assert_eq!(StudentsT::new(1.5, 0.0, 1.0).unwrap().variance(), f64::INFINITY);
    }
}
