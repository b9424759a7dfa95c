//! Result records and model checkpoints
//!
//! One result record and one best-model checkpoint per time step's run.
//! Records are JSON for downstream analysis; checkpoints are bincode
//! payloads with a small metadata block.

use crate::model::{GraphBertEncoder, ParamTensors};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// The per-time-step result persisted as `result_<dataset>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    /// Index into the validation history (one entry per validation pass).
    pub best_epoch: usize,
    pub best_valid_epoch_result: f64,
    pub best_test_epoch_result: f64,
    pub valid_epoch_auc: Vec<f64>,
    pub test_epoch_auc: Vec<f64>,
    pub epoch_train_loss: Vec<f64>,
}

pub fn write_result_record(path: &Path, record: &ResultRecord) -> Result<()> {
    let encoded = serde_json::to_string_pretty(record)?;
    fs::write(path, encoded)
        .with_context(|| format!("writing result record {}", path.display()))?;
    debug!(id = %record.id, "wrote result record");
    Ok(())
}

pub fn read_result_record(path: &Path) -> Result<ResultRecord> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading result record {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing result record {}", path.display()))
}

/// Checkpoint metadata, stored alongside the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub model_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub epoch: usize,
    pub val_auc: f64,
}

/// A serialized best-validation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub metadata: CheckpointMetadata,
    pub params: ParamTensors,
}

/// Persist the model's current parameters as the best checkpoint so far.
pub fn save_checkpoint(
    path: &Path,
    model: &GraphBertEncoder,
    epoch: usize,
    val_auc: f64,
) -> Result<()> {
    let checkpoint = Checkpoint {
        metadata: CheckpointMetadata {
            model_id: *model.model_id(),
            saved_at: Utc::now(),
            epoch,
            val_auc,
        },
        params: model.params().clone(),
    };
    let encoded = bincode::serialize(&checkpoint)?;
    fs::write(path, encoded)
        .with_context(|| format!("writing checkpoint {}", path.display()))?;
    debug!(epoch, val_auc, "wrote best-model checkpoint");
    Ok(())
}

pub fn load_checkpoint(path: &Path) -> Result<Checkpoint> {
    let raw =
        fs::read(path).with_context(|| format!("reading checkpoint {}", path.display()))?;
    bincode::deserialize(&raw)
        .with_context(|| format!("decoding checkpoint {}", path.display()))
}
