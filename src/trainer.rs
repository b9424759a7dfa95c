//! Training Loop Controller
//!
//! One call to [`train_time_step`] runs the full training for a single
//! time step: window selection, evaluation-data construction, the epoch
//! loop with periodic validation, best-model tracking with early stopping,
//! and finalization of the persisted artifacts. Runs are independent; the
//! only state shared between time steps is the read-only graph sequence
//! and encoding cache.

use crate::config::{TrainConfig, TrainingStrategy};
use crate::encoding::EncodingCache;
use crate::error::ForecastError;
use crate::eval_data::build_evaluation_data;
use crate::evaluation::evaluate_link_prediction;
use crate::graph::{normalize_adjacency_gcn, one_hot_features, GraphSequence};
use crate::model::{clip_gradient_norm, link_forecast_loss, Adam, GraphBertEncoder};
use crate::persistence::{save_checkpoint, write_result_record, ResultRecord};
use crate::sampling::MinibatchIterator;
use crate::window::select_window;
use crate::{config::RunPaths, npy::write_npy_f32};
use anyhow::{Context, Result};
use ndarray::Array2;
use std::fs;
use std::time::Instant;
use tracing::{debug, info};

/// Epochs without a validation improvement before the run stops early.
const EARLY_STOP_PATIENCE: usize = 100;

/// How a run's epoch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Converged,
    EarlyStopped,
}

/// Best-validation bookkeeping. Absent until the first improvement; still
/// absent at finalization means the run failed.
struct BestState {
    val_auc: f64,
    epoch: usize,
    val_pred_true: Array2<f32>,
}

/// Run one time step's full training and persist its artifacts. Returns
/// the result record also written to disk.
pub fn train_time_step(
    cfg: &TrainConfig,
    seq: &GraphSequence,
    cache: &EncodingCache,
    time_step: usize,
) -> Result<ResultRecord> {
    if cfg.strategy == TrainingStrategy::Unsupervised {
        return Err(ForecastError::Unimplemented {
            what: "unsupervised training".to_string(),
        }
        .into());
    }

    let identity = cfg.run_identity(time_step);
    let paths = RunPaths::new(&cfg.output_root, &identity);
    fs::create_dir_all(&paths.run_dir)
        .with_context(|| format!("creating run dir {}", paths.run_dir.display()))?;

    let window = select_window(cfg.window_size, seq.len(), time_step)?;
    info!(
        run = %identity.id(),
        window_start = window.start,
        window_end = window.end,
        eval = window.eval,
        "starting time step run"
    );

    let train_snapshots = &seq.snapshots[window.start..window.end];
    let norm_adjs: Vec<Array2<f32>> = train_snapshots
        .iter()
        .map(|s| normalize_adjacency_gcn(s, seq.num_nodes))
        .collect();
    let features = one_hot_features(seq.num_nodes);

    let eval_data = build_evaluation_data(
        seq,
        window.eval,
        &cfg.cache_dir,
        cfg.force_regen,
        cfg.seed,
    )?;
    info!(
        train = eval_data.train_edges.len(),
        val = eval_data.val_edges.len(),
        test = eval_data.test_edges.len(),
        "evaluation edge sets ready"
    );

    let mut iterator = MinibatchIterator::new(
        train_snapshots,
        seq.num_nodes,
        cfg.neg_sample_size,
        cfg.seed,
    );
    let mut model = GraphBertEncoder::new(
        cfg.encoder.clone(),
        seq.num_nodes,
        cache.vocab_sizes(),
        cfg.seed,
    );
    let mut optimizer = Adam::new(cfg.learning_rate, cfg.weight_decay, model.params());

    let mut epoch_train_loss_all: Vec<f64> = Vec::new();
    let mut had_val_history: Vec<f64> = Vec::new();
    let mut had_test_history: Vec<f64> = Vec::new();
    let mut sigmoid_val_history: Vec<f64> = Vec::new();
    let mut sigmoid_test_history: Vec<f64> = Vec::new();
    let mut best: Option<BestState> = None;
    let mut total_epoch_time = 0.0f64;
    let mut stop_reason = StopReason::Converged;

    for epoch in 0..cfg.num_epoches {
        model.train_mode();
        iterator.shuffle();
        let mut epoch_losses: Vec<f64> = Vec::new();
        let mut epoch_time = 0.0f64;
        let mut iter_idx = 0usize;

        while let Some(batch) = iterator.next_minibatch() {
            let batch_start = Instant::now();
            let offset = batch.window_end - 1;
            let absolute_t = window.start + offset;
            let bundle = cache.get(absolute_t)?;

            let fwd = model.forward(&features, &norm_adjs[offset], bundle);
            let (loss, d_out) = link_forecast_loss(
                &fwd.out,
                &batch.pos_edges,
                &batch.neg_edges,
                cfg.neg_weight,
            );
            let mut grads = model.backward(&fwd, &features, &norm_adjs[offset], bundle, &d_out);
            clip_gradient_norm(&mut grads, cfg.max_gradient_norm);
            optimizer.step(model.params_mut(), &grads);

            let elapsed = batch_start.elapsed().as_secs_f64();
            epoch_time += elapsed;
            epoch_losses.push(loss as f64);
            debug!(iter = iter_idx, loss = loss as f64, elapsed, "minibatch");
            iter_idx += 1;
        }

        let mean_loss = if epoch_losses.is_empty() {
            0.0
        } else {
            epoch_losses.iter().sum::<f64>() / epoch_losses.len() as f64
        };
        epoch_train_loss_all.push(mean_loss);
        total_epoch_time += epoch_time;
        debug!(epoch, mean_loss, epoch_time, "epoch finished");

        if (epoch + 1) % cfg.test_freq != 0 {
            continue;
        }

        // Validation pass: embeddings for the last window snapshot,
        // evaluated against the eval snapshot's edge sets.
        model.eval_mode();
        iterator.test_reset();
        let eval_offset = window.len() - 1;
        let bundle = cache.get(window.eval - 1)?;
        let fwd = model.forward(&features, &norm_adjs[eval_offset], bundle);
        // One node space, so the embedding serves as both source and target.
        let report = evaluate_link_prediction(&eval_data, &fwd.out, &fwd.out);

        info!(
            epoch,
            val_auc_had = report.had.val_auc,
            test_auc_had = report.had.test_auc,
            val_auc_sigmoid = report.sigmoid.val_auc,
            test_auc_sigmoid = report.sigmoid.test_auc,
            "validation"
        );
        had_val_history.push(report.had.val_auc);
        had_test_history.push(report.had.test_auc);
        sigmoid_val_history.push(report.sigmoid.val_auc);
        sigmoid_test_history.push(report.sigmoid.test_auc);

        let improved = best
            .as_ref()
            .map_or(true, |b| report.had.val_auc > b.val_auc);
        if improved {
            save_checkpoint(&paths.checkpoint_file, &model, epoch, report.had.val_auc)?;
            best = Some(BestState {
                val_auc: report.had.val_auc,
                epoch,
                val_pred_true: report.had.val_pred_true,
            });
        }

        if let Some(b) = &best {
            if patience_exceeded(epoch, b.epoch) {
                info!(epoch, best_epoch = b.epoch, "early stopping");
                stop_reason = StopReason::EarlyStopped;
                break;
            }
        }
    }

    // Finalization: model selection over the HAD validation history.
    let best_state = best.ok_or(ForecastError::NoImprovement { time_step })?;
    let best_epoch = argmax_first(&had_val_history);
    let sigmoid_best = sigmoid_val_history
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    info!(
        total_epoch_time,
        best_epoch,
        best_val = had_val_history[best_epoch],
        best_test = had_test_history[best_epoch],
        sigmoid_best_val = sigmoid_best,
        stopped_early = (stop_reason == StopReason::EarlyStopped),
        "run finished"
    );

    let record = ResultRecord {
        id: identity.id(),
        best_epoch,
        best_valid_epoch_result: had_val_history[best_epoch],
        best_test_epoch_result: had_test_history[best_epoch],
        valid_epoch_auc: had_val_history,
        test_epoch_auc: had_test_history,
        epoch_train_loss: epoch_train_loss_all,
    };
    write_result_record(&paths.result_file, &record)?;
    write_npy_f32(&paths.predictions_file, &best_state.val_pred_true)?;
    debug!(
        checkpoint = %paths.checkpoint_file.display(),
        predictions = %paths.predictions_file.display(),
        "artifacts persisted"
    );

    Ok(record)
}

/// First-occurrence argmax; ties resolve to the earliest index.
fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// True once `epoch` is at least `EARLY_STOP_PATIENCE` epochs past the
/// best one.
fn patience_exceeded(epoch: usize, best_epoch: usize) -> bool {
    epoch - best_epoch >= EARLY_STOP_PATIENCE
}
