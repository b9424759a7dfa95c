//! # LinkCast
//!
//! Temporal graph link forecasting with a Graph-BERT style encoder.
//!
//! Given a sequence of graph snapshots over time, LinkCast trains one
//! encoder per time step on a sliding window of prior snapshots and
//! predicts which node pairs form edges in the next snapshot. Each time
//! step's run is independent and persists a result record, a best-model
//! checkpoint, and the best epoch's validation predictions.
//!
//! ## Pipeline
//!
//! - [`graph`]: snapshot sequences, GCN adjacency normalization, features
//! - [`encoding`]: per-snapshot structural encodings with a disk cache
//! - [`window`]: training-window selection per time step
//! - [`eval_data`]: train/val/test edge sets for link prediction
//! - [`sampling`]: shuffled minibatch iteration with negative sampling
//! - [`model`]: the encoder, link-forecast loss, Adam, gradient clipping
//! - [`evaluation`]: HAD and SIGMOID scorers with rank-based ROC AUC
//! - [`trainer`]: the per-time-step training loop controller
//! - [`driver`]: the outer loop over all evaluated time steps
//! - [`persistence`]: result records and checkpoints
//!
//! ## Quick start
//!
//! ```no_run
//! use linkcast::config::{TrainConfig, TrainingStrategy};
//! use linkcast::driver::run_all_time_steps;
//! use linkcast::encoding::EncodingCache;
//! use linkcast::graph::GraphSequence;
//! use linkcast::model::EncoderConfig;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> anyhow::Result<()> {
//! let seq = GraphSequence::load(Path::new("data/enron/graphs.json"))?;
//! let cfg = TrainConfig {
//!     seed: 123,
//!     dataset: "enron".to_string(),
//!     model_name: "GraphBert".to_string(),
//!     num_epoches: 500,
//!     learning_rate: 0.01,
//!     weight_decay: 5e-4,
//!     neg_sample_size: 10,
//!     neg_weight: 1.0,
//!     max_gradient_norm: 1.0,
//!     test_freq: 10,
//!     window_size: 3,
//!     strategy: TrainingStrategy::Supervised,
//!     min_time: 3,
//!     max_time: seq.len() - 1,
//!     force_regen: false,
//!     output_root: PathBuf::from("runs"),
//!     cache_dir: PathBuf::from("cache"),
//!     encoder: EncoderConfig::default(),
//! };
//! let cache = EncodingCache::build(&seq, &cfg.cache_dir, false)?;
//! let summary = run_all_time_steps(&cfg, &seq, &cache);
//! println!("{} runs completed, {} failed", summary.completed(), summary.failed());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod eval_data;
pub mod evaluation;
pub mod graph;
pub mod model;
pub mod npy;
pub mod persistence;
pub mod sampling;
pub mod trainer;
pub mod window;

pub use config::{RunIdentity, RunPaths, TrainConfig, TrainingStrategy};
pub use error::ForecastError;
pub use persistence::ResultRecord;
