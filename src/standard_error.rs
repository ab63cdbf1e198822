//! Online mean/variance accumulator (Youngs–Cramer update, Chan et al. merge).
//!
//! Used for the Monte-Carlo stopping rule and for per-bucket noise in
//! histograms built from parallel batches. Merging two accumulators gives the
//! same result (up to rounding) as feeding all their samples into one.

/// Running `(n, sum, sum of squared deviations)` of a stream of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardError {
    n: usize,
    sum: f64,
    /// Σ(x - mean)², kept directly to avoid cancellation.
    ssd: f64,
}

impl StandardError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
        if self.n > 1 {
            let n = self.n as f64;
            let d = n * x - self.sum;
            self.ssd += d * d / (n * (n - 1.0));
        }
    }

    /// Adds `k` samples equal to zero.
    pub fn add_zeros(&mut self, k: usize) {
        self.merge(&StandardError {
            n: k,
            sum: 0.0,
            ssd: 0.0,
        });
    }

    pub fn merge(&mut self, other: &StandardError) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other.clone();
            return;
        }
        let (n1, n2) = (self.n as f64, other.n as f64);
        let d = n2 / n1 * self.sum - other.sum;
        self.ssd += other.ssd + n1 / (n2 * (n1 + n2)) * d * d;
        self.sum += other.sum;
        self.n += other.n;
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.sum / self.n as f64
    }

    /// Population variance of the accumulated values.
    pub fn variance(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.ssd / self.n as f64
    }

    /// Standard deviation of the accumulated values.
    pub fn sigma(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard error of `mean()`.
    pub fn std_error(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.variance() / self.n as f64).sqrt()
    }
}
