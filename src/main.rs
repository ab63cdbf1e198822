use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use textplots::{Chart, Plot, Shape};
use tracing::Level;

use compound_dist::formatting::{Format, display_scale, format_relative_error};
use compound_dist::{
    BucketsConfig, Distribution, Histogram, HistogramDistribution, ParallelSamplingConfig,
    SampleDistribution, Spacing, compound_histogram, compound_rand_distribution,
    fast_compound_rand_distribution, normalize, parsing,
};

#[derive(Parser)]
#[command(about = "Summarizes a sample and its n-fold compounded distribution", version)]
struct Args {
    /// Input file (stdin if not specified)
    input: Option<PathBuf>,

    /// JSON sampling settings; the flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of histogram buckets
    #[arg(short, long)]
    buckets: Option<usize>,

    /// Bucket spacing
    #[arg(long)]
    spacing: Option<Spacing>,

    /// Lower bucket bound
    #[arg(long, allow_hyphen_values = true)]
    min: Option<f64>,

    /// Upper bucket bound
    #[arg(long, allow_hyphen_values = true)]
    max: Option<f64>,

    /// Fit bucket spacing and range to the data
    #[arg(long)]
    auto_bounds: bool,

    /// Treat input as prices and summarize their log-returns
    #[arg(short, long)]
    log_returns: bool,

    /// Rescale input to zero mean and unit MAD
    #[arg(long)]
    normalize: bool,

    /// Sum this many independent draws
    #[arg(short = 'n', long)]
    compound: Option<usize>,

    /// Compounding technique
    #[arg(short, long, default_value = "fast")]
    method: Method,

    /// Samples drawn when compounding
    #[arg(short, long)]
    samples: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Output format
    #[arg(short, long)]
    fmt: Option<Format>,

    /// Print every bucket's weight and its relative error
    #[arg(long)]
    bucket_errors: bool,

    /// Log to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Method {
    /// Redraw n source samples per output sample
    #[value(name = "exact")]
    Exact,
    /// Sliding window over one stream of source samples
    #[value(name = "fast")]
    Fast,
    /// Importance sampling of the source density
    #[value(name = "importance")]
    Importance,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let cfg = load_config(&args)?;
    let mut data = read_input(args.input.as_deref())?;

    if data.is_empty() {
        eprintln!("no input");
        return Ok(());
    }

    if args.log_returns {
        data = parsing::log_returns(&data).context("computing log-returns")?;
    }
    if args.normalize {
        data = normalize(&data).context("normalizing input")?;
    }

    let format = args.fmt.unwrap_or(if args.log_returns && !args.normalize {
        Format::Percent
    } else {
        Format::Float
    });

    let len = data.len();
    let mut sample =
        SampleDistribution::fitted(data, &cfg.buckets).context("building sample buckets")?;
    if let Some(seed) = cfg.seed {
        sample = sample.with_seed(seed);
    }

    let (dist, histogram): (Box<dyn Distribution>, Option<Arc<Histogram>>) = match args.compound {
        Some(n) => compound(&mut sample, n, args.method, &cfg)?,
        None => (Box::new(sample), None),
    };

    print_stats_table(dist.as_ref(), len, args.compound, format);
    println!();
    plot_density(dist.as_ref(), format);

    if args.bucket_errors {
        match &histogram {
            Some(h) => print_bucket_errors(h, format),
            None => eprintln!("per-bucket errors are only tracked with --method importance"),
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<ParallelSamplingConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("error reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("error parsing {}", path.display()))?
        }
        // Without a config file there is no sensible default range.
        None => ParallelSamplingConfig {
            buckets: BucketsConfig {
                auto_bounds: true,
                ..Default::default()
            },
            ..Default::default()
        },
    };

    if let Some(n) = args.buckets {
        cfg.buckets.n = n;
    }
    if let Some(spacing) = args.spacing {
        cfg.buckets.spacing = spacing;
    }
    if let Some(min) = args.min {
        cfg.buckets.min = min;
        cfg.buckets.auto_bounds = false;
    }
    if let Some(max) = args.max {
        cfg.buckets.max = max;
        cfg.buckets.auto_bounds = false;
    }
    if args.auto_bounds {
        cfg.buckets.auto_bounds = true;
    }
    if let Some(samples) = args.samples {
        cfg.samples = samples;
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }

    cfg.validate().context("invalid sampling settings")?;
    Ok(cfg)
}

fn read_input(path: Option<&Path>) -> Result<Vec<f64>> {
    match path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("error opening {}", path.display()))?;
            parsing::read_file_mmap(&file)
                .with_context(|| format!("error reading {}", path.display()))
        }
        None => parsing::read_lines(io::stdin().lock()).context("error reading stdin"),
    }
}

/// Output buckets for an n-fold sum: fitted sample buckets are re-centered
/// on `n * mean` and widened by `sqrt(n)`; explicit bounds are kept.
fn compound_buckets(sample: &SampleDistribution, n: usize, base: &BucketsConfig) -> BucketsConfig {
    if !base.auto_bounds {
        return base.clone();
    }
    let buckets = sample.histogram().buckets();
    let mean = sample.mean();
    let reach = (buckets.upper() - mean).abs().max((mean - buckets.lower()).abs());
    let half = reach * (n as f64).sqrt();
    let center = mean * n as f64;
    BucketsConfig {
        n: base.n,
        spacing: Spacing::Linear,
        min: center - half,
        max: center + half,
        auto_bounds: false,
    }
}

fn compound(
    sample: &mut SampleDistribution,
    n: usize,
    method: Method,
    cfg: &ParallelSamplingConfig,
) -> Result<(Box<dyn Distribution>, Option<Arc<Histogram>>)> {
    let cfg = ParallelSamplingConfig {
        buckets: compound_buckets(sample, n, &cfg.buckets),
        ..cfg.clone()
    };
    tracing::info!(n, ?method, samples = cfg.samples, "compounding sample");

    Ok(match method {
        Method::Exact => {
            let dist = compound_rand_distribution(sample, n, &cfg)?;
            dist.histogram().context("error sampling compound distribution")?;
            (Box::new(dist), None)
        }
        Method::Fast => {
            let dist = fast_compound_rand_distribution(sample, n, &cfg)?;
            dist.histogram().context("error sampling compound distribution")?;
            (Box::new(dist), None)
        }
        Method::Importance => {
            let h = Arc::new(compound_histogram(sample, n, &cfg)?);
            let mut dist = HistogramDistribution::new(Arc::clone(&h));
            if let Some(seed) = cfg.seed {
                dist = dist.with_seed(seed);
            }
            (Box::new(dist), Some(h))
        }
    })
}

fn print_stats_table(dist: &dyn Distribution, len: usize, compound: Option<usize>, format: Format) {
    let mut left_items = vec![("n", len.to_string())];
    if let Some(k) = compound {
        left_items.push(("compound", format!("{k}x")));
    }
    left_items.push(("mean", format.format(dist.mean())));
    left_items.push(("mad", format.format(dist.mad())));
    left_items.push(("std dev", format.format(dist.sigma())));
    left_items.push(("variance", format.format(dist.variance())));

    let percentiles = [
        (0.0, "min"),
        (0.01, "1%ile"),
        (0.05, "5%ile"),
        (0.25, "25%ile"),
        (0.50, "median"),
        (0.75, "75%ile"),
        (0.95, "95%ile"),
        (0.99, "99%ile"),
        (1.0, "max"),
    ];

    let right_items: Vec<(&str, String)> = percentiles
        .iter()
        .map(|(q, label)| (*label, format.format(dist.quantile(*q))))
        .collect();

    let max_rows = left_items.len().max(right_items.len());

    for i in 0..max_rows {
        if let Some((label, value)) = left_items.get(i) {
            print!("{:>8}  {:<20}", label, value);
        } else {
            print!("{:30}", "");
        }

        if let Some((label, value)) = right_items.get(i) {
            println!("{:>8}  {}", label, value);
        } else {
            println!();
        }
    }
}

fn plot_density(dist: &dyn Distribution, format: Format) {
    let min_x = dist.quantile(0.001);
    let max_x = dist.quantile(0.999);
    if !(max_x > min_x) {
        return;
    }
    let (scale, unit) = display_scale(format);

    // Density lookups may be histogram interpolations; evaluate them in parallel
    // at the chart's horizontal resolution.
    const CHART_WIDTH: usize = 160;
    let points: Vec<(f32, f32)> = (0..CHART_WIDTH)
        .into_par_iter()
        .map(|i| {
            let x = min_x + (max_x - min_x) * (i as f64 / (CHART_WIDTH - 1) as f64);
            ((x * scale) as f32, dist.prob(x) as f32)
        })
        .collect();

    if !unit.is_empty() {
        println!("x in {unit}");
    }
    Chart::new(160, 40, (min_x * scale) as f32, (max_x * scale) as f32)
        .lineplot(&Shape::Lines(&points))
        .nice();
}

fn print_bucket_errors(h: &Histogram, format: Format) {
    println!("{:>12}  {:>10}  {:>10}  {:>8}", "bucket", "share", "samples", "error");
    let size = h.size();
    for i in 0..h.buckets().n() {
        let share = if size > 0.0 { h.weights()[i] / size } else { 0.0 };
        let error = h
            .std_error(i)
            .map(|e| format_relative_error(share, e))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>12}  {:>10.6}  {:>10}  {:>8}",
            format.format(h.buckets().x(i, 0.5)),
            share,
            h.counts()[i],
            error
        );
    }
}
