//! LinkCast CLI
//!
//! Loads a snapshot sequence, builds the structural-encoding cache once,
//! then trains one forecasting run per time step.

use anyhow::{bail, Context, Result};
use clap::Parser;
use linkcast::config::{TrainConfig, TrainingStrategy};
use linkcast::driver::run_all_time_steps;
use linkcast::encoding::EncodingCache;
use linkcast::graph::GraphSequence;
use linkcast::model::EncoderConfig;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "linkcast")]
#[command(about = "Temporal graph link forecasting with a Graph-BERT style encoder")]
#[command(version)]
struct Args {
    /// Dataset identifier; snapshots are read from <data-dir>/<dataset>/graphs.json
    #[arg(short, long)]
    dataset: String,

    /// Directory holding dataset subdirectories
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Seed for every stochastic source
    #[arg(long, default_value_t = 123)]
    seed: u64,

    /// Model name used in run identities
    #[arg(long, default_value = "GraphBert")]
    model_name: String,

    /// Epoch cap per time step
    #[arg(long, default_value_t = 500)]
    num_epoches: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Adam weight decay
    #[arg(long, default_value_t = 5e-4)]
    weight_decay: f32,

    /// Negative samples per positive training edge
    #[arg(long, default_value_t = 10)]
    neg_sample_size: usize,

    /// Negative-class weight in the link-forecast loss
    #[arg(long, default_value_t = 1.0)]
    neg_weight: f32,

    /// Global gradient-norm clip
    #[arg(long, default_value_t = 1.0)]
    max_gradient_norm: f32,

    /// Validate every N epochs
    #[arg(long, default_value_t = 10)]
    test_freq: usize,

    /// Number of prior snapshots trained on per time step
    #[arg(long, default_value_t = 3)]
    window_size: usize,

    /// First evaluated time step (defaults to the first with enough history)
    #[arg(long)]
    min_time: Option<usize>,

    /// Last evaluated time step (defaults to the final snapshot)
    #[arg(long)]
    max_time: Option<usize>,

    /// Train with the unsupervised objective (not implemented)
    #[arg(long)]
    unsupervised: bool,

    /// Rebuild cached evaluation edge sets even when present
    #[arg(long)]
    force_regen: bool,

    /// Root directory for per-run outputs
    #[arg(long, default_value = "runs")]
    output_root: PathBuf,

    /// Directory for on-disk caches
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Embedding dimensions
    #[arg(long, default_value_t = 64)]
    dimensions: usize,

    /// Hidden layer width
    #[arg(long, default_value_t = 64)]
    hidden: usize,

    /// Dropout on the hidden layer
    #[arg(long, default_value_t = 0.1)]
    dropout: f64,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    fs::create_dir_all(&args.output_root)
        .with_context(|| format!("creating output root {}", args.output_root.display()))?;
    let log_path = args.output_root.join(format!(
        "linkcast_{}.log",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("creating log file {}", log_path.display()))?;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .init();

    let graphs_path = args.data_dir.join(&args.dataset).join("graphs.json");
    let seq = GraphSequence::load(&graphs_path)?;
    info!(
        dataset = %seq.dataset,
        snapshots = seq.len(),
        num_nodes = seq.num_nodes,
        "loaded graph sequence"
    );

    if seq.len() <= args.window_size {
        bail!(
            "dataset '{}' has {} snapshots, need more than the window size {}",
            args.dataset,
            seq.len(),
            args.window_size
        );
    }
    let min_time = args.min_time.unwrap_or(args.window_size).max(args.window_size);
    let max_time = args.max_time.unwrap_or(seq.len() - 1).min(seq.len() - 1);
    if min_time > max_time {
        bail!("no evaluable time steps: min_time {min_time} > max_time {max_time}");
    }

    let cfg = TrainConfig {
        seed: args.seed,
        dataset: args.dataset,
        model_name: args.model_name,
        num_epoches: args.num_epoches,
        learning_rate: args.learning_rate,
        weight_decay: args.weight_decay,
        neg_sample_size: args.neg_sample_size,
        neg_weight: args.neg_weight,
        max_gradient_norm: args.max_gradient_norm,
        test_freq: args.test_freq,
        window_size: args.window_size,
        strategy: if args.unsupervised {
            TrainingStrategy::Unsupervised
        } else {
            TrainingStrategy::Supervised
        },
        min_time,
        max_time,
        force_regen: args.force_regen,
        output_root: args.output_root,
        cache_dir: args.cache_dir,
        encoder: EncoderConfig {
            dimensions: args.dimensions,
            hidden: args.hidden,
            dropout: args.dropout,
        },
    };
    info!(config = ?cfg, log_file = %log_path.display(), "configuration");

    let cache = EncodingCache::build(&seq, &cfg.cache_dir, cfg.force_regen)?;
    let summary = run_all_time_steps(&cfg, &seq, &cache);

    if summary.completed() == 0 {
        bail!("all {} time steps failed", summary.failed());
    }
    info!(
        completed = summary.completed(),
        failed = summary.failed(),
        "done"
    );
    Ok(())
}
