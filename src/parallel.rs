//! Batched parallel sampling with single-threaded reduction.
//!
//! A sample budget is cut into batches; each batch runs on a worker thread
//! with its own copy of the source distribution and its own uniform stream,
//! and sends a partial result back over a bounded channel. Only the calling
//! thread merges results, so accumulators never need locking.

use std::sync::{Arc, mpsc};

use rand_xoshiro::Xoshiro256PlusPlus;

use crate::buckets::Buckets;
use crate::config::ParallelSamplingConfig;
use crate::distribution::{Distribution, fork_rng, new_rng};
use crate::error::{Error, Result};
use crate::histogram::Histogram;

/// Work handed to one worker.
pub struct Batch {
    pub source: Box<dyn Distribution>,
    pub rng: Xoshiro256PlusPlus,
    pub samples: usize,
}

/// Batch sizes covering `total`: `clamp(total / workers, min, max)` each,
/// the last one shrunk to what is left. If `batch_min > batch_max` the
/// upper bound wins.
pub fn batch_sizes(
    total: usize,
    workers: usize,
    batch_min: usize,
    batch_max: usize,
) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    let size = (total / workers.max(1)).max(batch_min).min(batch_max).max(1);
    let mut sizes = Vec::with_capacity(total.div_ceil(size));
    let mut left = total;
    while left > 0 {
        let s = size.min(left);
        sizes.push(s);
        left -= s;
    }
    sizes
}

/// Runs `work` over `jobs` on `workers` threads and feeds every result to
/// `reduce` on the calling thread, in completion order. With one worker
/// everything runs inline, in job order.
pub fn map_reduce<J, R, W, F>(workers: usize, jobs: Vec<J>, work: W, mut reduce: F) -> Result<()>
where
    J: Send + 'static,
    R: Send + 'static,
    W: Fn(J) -> R + Send + Sync + 'static,
    F: FnMut(R) -> Result<()>,
{
    tracing::debug!(batches = jobs.len(), workers, "dispatching batches");
    if workers <= 1 || jobs.len() <= 1 {
        for job in jobs {
            reduce(work(job))?;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("sampler-{i}"))
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;
    let work = Arc::new(work);
    let (tx, rx) = mpsc::sync_channel(workers);
    for job in jobs {
        let tx = tx.clone();
        let work = Arc::clone(&work);
        pool.spawn(move || {
            // Send only fails once the reducer has bailed out.
            let _ = tx.send(work(job));
        });
    }
    drop(tx);

    for result in rx {
        reduce(result)?;
    }
    Ok(())
}

/// Samples `cfg.samples` values into a histogram over `buckets`.
///
/// `source` is forked once per batch before anything is dispatched, so the
/// outcome depends only on the source's seed (and on merge order, up to
/// rounding). `batch` fills one partial histogram per call.
pub fn sample_histogram<B>(
    source: &mut dyn Distribution,
    cfg: &ParallelSamplingConfig,
    buckets: &Buckets,
    track_errors: bool,
    batch: B,
) -> Result<Histogram>
where
    B: Fn(Batch, &Buckets) -> Result<Histogram> + Send + Sync + 'static,
{
    cfg.validate()?;
    let workers = cfg.workers();
    let mut rng = new_rng(cfg.seed);
    let jobs: Vec<Batch> = batch_sizes(cfg.samples, workers, cfg.batch_min, cfg.batch_max)
        .into_iter()
        .map(|samples| Batch {
            source: source.copy(),
            rng: fork_rng(&mut rng),
            samples,
        })
        .collect();

    let mut total = Histogram::new(buckets);
    if track_errors {
        total = total.with_std_errors();
    }
    let worker_buckets = buckets.clone();
    map_reduce(
        workers,
        jobs,
        move |job| batch(job, &worker_buckets),
        |partial| total.add_histogram(&partial?),
    )?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::Spacing;
    use crate::distribution::{Normal, uniform};

    #[test]
    fn test_batch_sizes_even_split() {
        assert_eq!(batch_sizes(100, 4, 1, 1000), vec![25, 25, 25, 25]);
    }

    #[test]
    fn test_batch_sizes_clamped_and_shrunk() {
        assert_eq!(batch_sizes(100, 4, 30, 1000), vec![30, 30, 30, 10]);
        assert_eq!(batch_sizes(100, 1, 1, 40), vec![40, 40, 20]);
        assert_eq!(batch_sizes(5, 16, 10, 100), vec![5]);
        assert!(batch_sizes(0, 4, 1, 10).is_empty());
    }

    #[test]
    fn test_batch_sizes_inverted_bounds() {
        assert_eq!(batch_sizes(100, 4, 50, 20), vec![20, 20, 20, 20, 20]);
        assert_eq!(batch_sizes(7, 1, 10, 0), vec![1; 7]);
    }

    #[test]
    fn test_batch_sizes_cover_total() {
        for (total, workers) in [(10_007, 3), (1, 8), (999, 999), (12_345, 0)] {
            let sizes = batch_sizes(total, workers, 7, 500);
            assert_eq!(sizes.iter().sum::<usize>(), total);
            assert!(sizes.iter().all(|&s| s <= 500));
        }
    }

    #[test]
    fn test_map_reduce_parallel_matches_serial() {
        let jobs = || (1..=50u64).collect::<Vec<_>>();
        let mut serial = Vec::new();
        map_reduce(1, jobs(), |x| x * x, |r| {
            serial.push(r);
            Ok(())
        })
        .unwrap();

        let mut parallel = Vec::new();
        map_reduce(4, jobs(), |x| x * x, |r| {
            parallel.push(r);
            Ok(())
        })
        .unwrap();

        parallel.sort_unstable();
        assert_eq!(serial, parallel);
        assert_eq!(serial.iter().sum::<u64>(), (1..=50u64).map(|x| x * x).sum::<u64>());
    }

    #[test]
    fn test_map_reduce_propagates_reduce_error() {
        let result = map_reduce(3, (0..20).collect::<Vec<i32>>(), |x| x, |r| {
            if r == 7 { Err(Error::NotANumber) } else { Ok(()) }
        });
        assert_eq!(result, Err(Error::NotANumber));
    }

    fn uniform_batch(job: Batch, buckets: &Buckets) -> Result<Histogram> {
        let Batch { mut rng, samples, .. } = job;
        let mut h = Histogram::new(buckets);
        h.add_all((0..samples).map(|_| uniform(&mut rng)));
        Ok(h)
    }

    #[test]
    fn test_sample_histogram_uses_full_budget() {
        let buckets = Buckets::new(10, 0.0, 1.0, Spacing::Linear).unwrap();
        let cfg = ParallelSamplingConfig {
            samples: 12_345,
            batch_min: 100,
            batch_max: 1000,
            workers: 4,
            seed: Some(1),
            ..Default::default()
        };
        let mut source = Normal::new(0.0, 1.0).unwrap();
        let h = sample_histogram(&mut source, &cfg, &buckets, true, uniform_batch).unwrap();
        assert_eq!(h.count_total(), 12_345);
        assert!((h.mean() - 0.5).abs() < 0.02);
        let errs = h.std_errors().unwrap();
        assert_eq!(errs[0].n(), 13);
    }

    #[test]
    fn test_sample_histogram_serial_is_reproducible() {
        let buckets = Buckets::new(10, 0.0, 1.0, Spacing::Linear).unwrap();
        let cfg = ParallelSamplingConfig {
            samples: 2_000,
            workers: 1,
            seed: Some(9),
            ..Default::default()
        };
        let mut source = Normal::new(0.0, 1.0).unwrap();
        let a = sample_histogram(&mut source, &cfg, &buckets, false, uniform_batch).unwrap();
        let b = sample_histogram(&mut source, &cfg, &buckets, false, uniform_batch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_histogram_propagates_batch_error() {
        let buckets = Buckets::new(10, 0.0, 1.0, Spacing::Linear).unwrap();
        let cfg = ParallelSamplingConfig {
            samples: 1_000,
            batch_min: 100,
            workers: 2,
            ..Default::default()
        };
        let mut source = Normal::new(0.0, 1.0).unwrap();
        let result =
            sample_histogram(&mut source, &cfg, &buckets, false, |_, _| Err(Error::NotANumber));
        assert_eq!(result, Err(Error::NotANumber));
    }
}
