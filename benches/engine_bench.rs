use compound_dist::{
    Buckets, BucketsConfig, Distribution, Histogram, Normal, ParallelSamplingConfig,
    SampleDistribution, Spacing, compound_histogram, compound_rand_distribution,
    fast_compound_rand_distribution, parsing,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Write as IoWrite;
use tempfile::NamedTempFile;

fn generate_test_file(n: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for i in 1..=n {
        writeln!(file, "{}", 100.0 + (i % 97) as f64 * 0.01).unwrap();
    }
    file.flush().unwrap();
    file
}

fn sampling_config(samples: usize) -> ParallelSamplingConfig {
    ParallelSamplingConfig {
        buckets: BucketsConfig {
            n: 101,
            spacing: Spacing::Linear,
            min: -40.0,
            max: 40.0,
            auto_bounds: false,
        },
        samples,
        batch_min: 1_000,
        seed: Some(1),
        ..Default::default()
    }
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    for size in [1_000, 100_000, 1_000_000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("read_file_mmap", size), &size, |b, &size| {
            let temp_file = generate_test_file(size);
            b.iter(|| {
                let file = temp_file.reopen().unwrap();
                black_box(parsing::read_file_mmap(&file).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_histogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("histogram");

    for size in [1_000, 100_000, 1_000_000] {
        let data: Vec<f64> = (0..size).map(|i| i as f64).collect();
        group.throughput(Throughput::Elements(size as u64));

        for spacing in [Spacing::Linear, Spacing::SymmetricExponential] {
            let buckets = match spacing {
                Spacing::SymmetricExponential => {
                    Buckets::new(101, 1.0, size as f64, spacing).unwrap()
                }
                _ => Buckets::new(100, 0.0, size as f64, spacing).unwrap(),
            };
            group.bench_with_input(
                BenchmarkId::new(format!("add_all_{spacing:?}"), size),
                &data,
                |b, data| {
                    b.iter(|| {
                        let mut h = Histogram::new(&buckets);
                        h.add_all(data.iter().copied());
                        black_box(h)
                    });
                },
            );
        }

        let buckets = Buckets::new(100, 0.0, size as f64, Spacing::Linear).unwrap();
        let sample = SampleDistribution::new(data.clone(), &buckets);
        sample.histogram();
        group.bench_with_input(BenchmarkId::new("quantile_99th", size), &sample, |b, sample| {
            b.iter(|| black_box(sample.histogram().quantile(black_box(0.99))));
        });
    }

    group.finish();
}

fn bench_compounding(c: &mut Criterion) {
    let mut group = c.benchmark_group("compounding");
    group.sample_size(10);

    for n in [4, 16, 64] {
        let cfg = sampling_config(50_000);
        group.throughput(Throughput::Elements(cfg.samples as u64));

        group.bench_with_input(BenchmarkId::new("exact", n), &n, |b, &n| {
            let mut source = Normal::new(0.0, 1.0).unwrap();
            b.iter(|| {
                let dist = compound_rand_distribution(&mut source, n, &cfg).unwrap();
                black_box(dist.mad())
            });
        });

        group.bench_with_input(BenchmarkId::new("fast", n), &n, |b, &n| {
            let mut source = Normal::new(0.0, 1.0).unwrap();
            b.iter(|| {
                let dist = fast_compound_rand_distribution(&mut source, n, &cfg).unwrap();
                black_box(dist.mad())
            });
        });

        group.bench_with_input(BenchmarkId::new("importance", n), &n, |b, &n| {
            let mut source = Normal::new(0.0, 1.0).unwrap();
            b.iter(|| black_box(compound_histogram(&mut source, n, &cfg).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_histogram, bench_compounding);
criterion_main!(benches);
