//! GhostRider Miner CLI
//!
//! Tunes and benchmarks the GhostRider memory modes on this machine.
//!
//! # Commands
//!
//! - `tune` - Find the fastest memory mode per heavy rotation and save it
//! - `benchmark` - Cycle through all rotations and report the hashrate
//! - `sequence` - Show the stage sequence a header selects
//! - `hash` - Hash a single header

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ghostrider::algorithm::bench::{BenchOptions, SegmentLength, TuneOptions, benchmark, tune};
use ghostrider::algorithm::{self, TuneError, TuneTable, WorkerContext, parse_header};
use ghostrider::{KernelChoice, KernelKind, MinerConfig, meets_difficulty};

#[derive(Parser)]
#[command(name = "gr-miner")]
#[command(author = "Cyberia")]
#[command(version = "0.1.0")]
#[command(about = "GhostRider auto-tuner and benchmark harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON run configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by GR_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Number of threads to use (default: number of CPU cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Seconds per measured segment
    #[arg(short, long)]
    segment_secs: Option<f64>,

    /// Hash kernel
    #[arg(short, long, value_enum)]
    kernel: Option<KernelChoice>,

    /// Tuned configuration file
    #[arg(long)]
    tune_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure every memory mode of every rotation and save the fastest
    Tune(RunArgs),

    /// Run one benchmark cycle over all rotations
    Benchmark(RunArgs),

    /// Show the stage sequence and scratch size a header selects
    Sequence {
        /// 80-byte block header as hex
        #[arg(long)]
        header: String,
    },

    /// Hash a single header
    Hash {
        /// 80-byte block header as hex
        #[arg(long)]
        header: String,

        /// Report whether the digest has this many leading zero bits
        #[arg(short, long)]
        difficulty: Option<u32>,

        /// Hash kernel
        #[arg(short, long, value_enum)]
        kernel: Option<KernelChoice>,
    },
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("GR_LOG").unwrap_or_else(|_| {
        if verbose { "debug".to_string() } else { "info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Tune(args) => cmd_tune(merge(config, args)),
        Commands::Benchmark(args) => cmd_benchmark(merge(config, args)),
        Commands::Sequence { header } => cmd_sequence(&header, &config),
        Commands::Hash {
            header,
            difficulty,
            kernel,
        } => cmd_hash(&header, difficulty, kernel.unwrap_or(config.kernel)),
    });

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MinerConfig> {
    match path {
        Some(path) => MinerConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(MinerConfig::default()),
    }
}

/// Settings of one tune or benchmark run after flags override the config
struct Run {
    config: MinerConfig,
    segment_secs: Option<f64>,
}

fn merge(mut config: MinerConfig, args: RunArgs) -> Run {
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    if let Some(kernel) = args.kernel {
        config.kernel = kernel;
    }
    if let Some(path) = args.tune_file {
        config.tune_file = path;
    }
    Run {
        config,
        segment_secs: args.segment_secs,
    }
}

fn segment(secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid segment length {secs}"))
}

fn cmd_tune(run: Run) -> anyhow::Result<()> {
    let config = run.config;
    config.validate()?;

    let opts = TuneOptions {
        threads: config.thread_count(),
        kernel: config.kernel.into(),
        segment: segment(run.segment_secs.unwrap_or(config.tune_segment_secs))?,
        tune_file: Some(config.tune_file.clone()),
    };

    println!("Tuning {} rotations...", algorithm::ROTATIONS);
    println!("Threads: {}", opts.threads);
    println!(
        "Estimated time: {:.0}s",
        opts.segment.as_secs_f64() * (algorithm::ROTATIONS * algorithm::FLAG_COMBOS) as f64
    );

    let start = Instant::now();
    let outcome = tune(&opts);

    println!("\nResults:");
    for (r, rotation) in algorithm::ROTATION_TABLE.iter().enumerate() {
        println!(
            "  Rotation {:2} {:?}: {:?} {:.2} H/s",
            r,
            rotation,
            outcome.table.get(r),
            outcome.rates[r]
        );
    }
    println!("  Time elapsed: {:.2}s", start.elapsed().as_secs_f64());
    println!("  Saved to: {}", config.tune_file.display());

    Ok(())
}

/// Tuned table from `path`, or `None` when the file does not exist
fn load_tuned(path: &Path) -> anyhow::Result<Option<TuneTable>> {
    match TuneTable::load(path) {
        Ok(table) => {
            log::info!("using tuned config from {}", path.display());
            Ok(Some(table))
        }
        Err(TuneError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("no tuned config at {}, running base memory", path.display());
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn cmd_benchmark(run: Run) -> anyhow::Result<()> {
    let config = run.config;
    let segment_secs = run.segment_secs.or(config.bench_segment_secs);
    config.validate()?;

    let opts = BenchOptions {
        threads: config.thread_count(),
        kernel: config.kernel.into(),
        segment: match segment_secs {
            Some(secs) => SegmentLength::Fixed(segment(secs)?),
            None => SegmentLength::Realistic,
        },
        tuned: load_tuned(&config.tune_file)?,
    };

    println!("Running benchmark over {} rotations...", algorithm::ROTATIONS);
    println!("Threads: {}", opts.threads);

    let report = benchmark(&opts);

    println!("\nResults:");
    println!("  Total hashes: {}", report.hashes);
    println!("  Time elapsed: {:.2}s", report.seconds);
    println!("  Hashrate: {:.2} H/s", report.average());
    println!(
        "  Per thread: {:.2} H/s",
        report.average() / opts.threads.max(1) as f64
    );

    println!("\nAlgorithm parameters:");
    println!("  Stages: {}", algorithm::SEQUENCE_LEN);
    println!(
        "  Heavy memory: {:?} KB",
        algorithm::HEAVY_BASE_MEMORY.map(|m| m / 1024)
    );
    println!("  Tuned: {}", opts.tuned.is_some());
    println!("  Target factor: {}", algorithm::TARGET_FACTOR);

    Ok(())
}

fn decode_header(hex_header: &str) -> anyhow::Result<[u8; algorithm::HEADER_LEN]> {
    let bytes = hex::decode(hex_header.trim()).context("header is not valid hex")?;
    Ok(parse_header(&bytes)?)
}

fn cmd_sequence(hex_header: &str, config: &MinerConfig) -> anyhow::Result<()> {
    let header = decode_header(hex_header)?;
    let mut ctx = WorkerContext::new(0);
    ctx.set_sequence(algorithm::derive_from_header(&header));

    println!("Sequence: {}", ctx.sequence());
    println!("Heavy ids: {:?}", ctx.sequence().heavy_ids());
    println!("Scratch (base): {} KB", ctx.needed_memory() / 1024);

    if let Some(table) = load_tuned(&config.tune_file)? {
        ctx.select_tuned_config(&table);
        println!("Tuned flags: {:?}", ctx.flags());
        println!("Scratch (tuned): {} KB", ctx.needed_memory() / 1024);
    }

    Ok(())
}

fn cmd_hash(hex_header: &str, difficulty: Option<u32>, kernel: KernelChoice) -> anyhow::Result<()> {
    let header = decode_header(hex_header)?;
    let kernel = KernelKind::from(kernel).kernel();

    let mut ctx = WorkerContext::new(0);
    ctx.set_sequence(algorithm::derive_from_header(&header));
    ctx.allocate_needed_memory()?;

    // Every lane carries the same header
    let inputs = vec![algorithm::format_header(&header); kernel.lanes()];
    let mut out = vec![[0u8; algorithm::DIGEST_SIZE]; kernel.lanes()];

    let start = Instant::now();
    kernel.hash(&mut ctx, &inputs, &mut out)?;
    let elapsed = start.elapsed();

    println!("Sequence: {}", ctx.sequence());
    println!("Hash: {}", hex::encode(out[0]));
    println!("Time: {:.2}ms ({})", elapsed.as_secs_f64() * 1000.0, kernel.name());
    if let Some(bits) = difficulty {
        println!("Meets {} bits: {}", bits, meets_difficulty(&out[0], bits));
    }

    Ok(())
}
