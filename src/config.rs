//! Run configuration and run identity
//!
//! The configuration is built once at startup and passed by reference to
//! every component. Anything derived for a single time step's run (window,
//! result id, artifact paths) lives in per-run values, never written back
//! into the shared configuration.

use crate::model::EncoderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a run trains the encoder.
///
/// The unsupervised variant (random-walk context pairs in the lineage this
/// pipeline comes from) is recognized but not implemented; selecting it
/// fails explicitly at run initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingStrategy {
    Supervised,
    Unsupervised,
}

/// Immutable configuration for the whole invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Seed for every stochastic source in a run.
    pub seed: u64,
    /// Dataset identifier; names the snapshot file and all artifacts.
    pub dataset: String,
    /// Model name, used in run identities.
    pub model_name: String,
    /// Epoch cap per time step.
    pub num_epoches: usize,
    /// Adam learning rate.
    pub learning_rate: f32,
    /// Adam weight decay (L2).
    pub weight_decay: f32,
    /// Negative samples per positive training edge.
    pub neg_sample_size: usize,
    /// Weight of the negative class in the link-forecast loss.
    pub neg_weight: f32,
    /// Global gradient-norm clip.
    pub max_gradient_norm: f32,
    /// Validate every `test_freq` epochs.
    pub test_freq: usize,
    /// Number of prior snapshots trained on per time step.
    pub window_size: usize,
    /// Training strategy.
    pub strategy: TrainingStrategy,
    /// First evaluated time step (inclusive).
    pub min_time: usize,
    /// Last evaluated time step (inclusive).
    pub max_time: usize,
    /// Rebuild cached evaluation edge sets even when present on disk.
    pub force_regen: bool,
    /// Root directory for per-run output directories.
    pub output_root: PathBuf,
    /// Directory for on-disk caches (encodings, evaluation edge sets).
    pub cache_dir: PathBuf,
    /// Encoder hyperparameters.
    pub encoder: EncoderConfig,
}

impl TrainConfig {
    /// Identity of the run for one time step.
    pub fn run_identity(&self, time_step: usize) -> RunIdentity {
        RunIdentity {
            model_name: self.model_name.clone(),
            dataset: self.dataset.clone(),
            seed: self.seed,
            time_step,
        }
    }
}

/// The value object every artifact path is derived from. One formatting
/// function; no per-component string drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub model_name: String,
    pub dataset: String,
    pub seed: u64,
    pub time_step: usize,
}

impl RunIdentity {
    /// Result identifier, also the run's output directory name.
    pub fn id(&self) -> String {
        format!(
            "Final_{}_{}_seed_{}_time_{}",
            self.model_name, self.dataset, self.seed, self.time_step
        )
    }
}

/// Artifact locations for one time step's run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub result_file: PathBuf,
    pub checkpoint_file: PathBuf,
    pub predictions_file: PathBuf,
}

impl RunPaths {
    pub fn new(output_root: &Path, identity: &RunIdentity) -> Self {
        let run_dir = output_root.join(identity.id());
        Self {
            result_file: run_dir.join(format!("result_{}.json", identity.dataset)),
            checkpoint_file: run_dir.join(format!("best_valid_model_{}.bin", identity.dataset)),
            predictions_file: run_dir.join("test_pred_true.npy"),
            run_dir,
        }
    }
}
