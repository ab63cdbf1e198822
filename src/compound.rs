//! Histogram of an n-fold sum built from the source density by importance
//! sampling.
//!
//! Instead of drawing real samples and adding them up, each summand is placed
//! through a change of variables `x(t)` with `t` uniform on `(-1, 1)` and
//! weighted by `prob(x) * x'(t)`. The substitution stretches the ends of
//! `(-1, 1)` over the tails, so rare sums are visited far more often than
//! plain sampling would visit them, and the weights correct for it.

use crate::buckets::Buckets;
use crate::config::ParallelSamplingConfig;
use crate::distribution::{Distribution, uniform};
use crate::error::{Error, Result};
use crate::histogram::Histogram;
use crate::parallel::{self, Batch};

/// `x(t) = shift + scale * t / (1 - |t|^(2 power))` for `t` in `(-1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableSubstitution {
    pub shift: f64,
    pub scale: f64,
    pub power: f64,
}

impl VariableSubstitution {
    /// Bias for summing `n` variables into `buckets`: `scale` spreads one
    /// summand over `max(|bounds|) / sqrt(n)`, `power` is `ceil(sqrt(n))`.
    /// Values set in `cfg` take precedence; `shift` defaults to `mean`.
    pub fn for_compound(
        buckets: &Buckets,
        n: usize,
        cfg: &ParallelSamplingConfig,
        mean: f64,
    ) -> Self {
        let root = (n as f64).sqrt();
        let reach = buckets.lower().abs().max(buckets.upper().abs());
        VariableSubstitution {
            shift: cfg.bias_shift.unwrap_or(mean),
            scale: cfg.bias_scale.unwrap_or(reach / root),
            power: cfg.bias_power.unwrap_or(root.ceil()),
        }
    }

    pub fn x(&self, t: f64) -> f64 {
        let a = t.abs().powf(2.0 * self.power);
        self.shift + self.scale * t / (1.0 - a)
    }

    /// Derivative `x'(t) = scale * (1 + (2 power - 1) a) / (1 - a)^2`, `a = |t|^(2 power)`.
    pub fn dx_dt(&self, t: f64) -> f64 {
        let a = t.abs().powf(2.0 * self.power);
        let d = 1.0 - a;
        self.scale * (1.0 + (2.0 * self.power - 1.0) * a) / (d * d)
    }
}

/// Histogram of the sum of `n` i.i.d. variables with density `source.prob`.
///
/// The result tracks a per-bucket [`StandardError`](crate::StandardError)
/// across batches; buckets with a large error relative to their weight are
/// not well supported by the samples.
pub fn compound_histogram(
    source: &mut dyn Distribution,
    n: usize,
    cfg: &ParallelSamplingConfig,
) -> Result<Histogram> {
    if n == 0 {
        return Err(Error::InvalidParameters("compound count must be positive".into()));
    }
    cfg.validate()?;
    let buckets = Buckets::from_config(&cfg.buckets, None)?;
    let sub = VariableSubstitution::for_compound(&buckets, n, cfg, source.mean());
    if !sub.shift.is_finite() {
        return Err(Error::InvalidParameters(format!(
            "bias shift must be finite, got {}",
            sub.shift
        )));
    }
    tracing::debug!(n, ?sub, samples = cfg.samples, "importance-sampling compound histogram");

    parallel::sample_histogram(source, cfg, &buckets, true, move |job, buckets| {
        let Batch {
            source,
            mut rng,
            samples,
        } = job;
        let mut h = Histogram::new(buckets);
        let mut dropped = 0usize;
        for _ in 0..samples {
            let mut y = 0.0;
            let mut w = 1.0;
            for _ in 0..n {
                let t = 2.0 * uniform(&mut rng) - 1.0;
                let x = sub.x(t);
                y += x;
                w *= source.prob(x) * sub.dx_dt(t);
            }
            if y.is_finite() && w.is_finite() && w > 0.0 {
                h.add_with_weight(y, w);
            } else {
                dropped += 1;
            }
        }
        if dropped * 10 > samples {
            tracing::warn!(dropped, samples, "many importance samples had degenerate weights");
        }
        Ok(h)
    })
}
