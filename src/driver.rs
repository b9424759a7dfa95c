//! Outer driver over the evaluated time steps
//!
//! Invokes the Training Loop Controller once per time step in
//! `[min_time, max_time]`. Each run is independent; a failed step is
//! logged with its full error chain and the loop moves on to the next.

use crate::config::TrainConfig;
use crate::encoding::EncodingCache;
use crate::graph::GraphSequence;
use crate::persistence::ResultRecord;
use crate::trainer::train_time_step;
use tracing::{error, info};

/// What happened across the whole time-step loop.
#[derive(Debug, Default)]
pub struct DriverSummary {
    pub records: Vec<(usize, ResultRecord)>,
    pub failures: Vec<(usize, anyhow::Error)>,
}

impl DriverSummary {
    pub fn completed(&self) -> usize {
        self.records.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Run every time step, isolating per-step failures.
pub fn run_all_time_steps(
    cfg: &TrainConfig,
    seq: &GraphSequence,
    cache: &EncodingCache,
) -> DriverSummary {
    let mut summary = DriverSummary::default();
    for time_step in cfg.min_time..=cfg.max_time {
        info!(time_step, "running time step");
        match train_time_step(cfg, seq, cache, time_step) {
            Ok(record) => {
                info!(
                    time_step,
                    best_epoch = record.best_epoch,
                    best_val = record.best_valid_epoch_result,
                    "time step completed"
                );
                summary.records.push((time_step, record));
            }
            Err(err) => {
                let chain = format!("{err:#}");
                error!(time_step, error = %chain, "time step failed");
                summary.failures.push((time_step, err));
            }
        }
    }
    info!(
        completed = summary.completed(),
        failed = summary.failed(),
        "time step loop finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingStrategy;
    use crate::error::ForecastError;
    use crate::graph::GraphSnapshot;
    use crate::model::EncoderConfig;

    fn sequence() -> GraphSequence {
        let num_nodes = 10;
        let snapshots = (0..5)
            .map(|t| {
                let mut edges: Vec<(usize, usize)> =
                    (0..num_nodes).map(|i| (i, (i + 1) % num_nodes)).collect();
                for c in 0..t {
                    edges.push((c, (c + 4) % num_nodes));
                }
                GraphSnapshot::new(edges)
            })
            .collect();
        GraphSequence {
            dataset: "driver".to_string(),
            num_nodes,
            snapshots,
        }
    }

    fn config(dir: &std::path::Path, min_time: usize, max_time: usize) -> TrainConfig {
        TrainConfig {
            seed: 7,
            dataset: "driver".to_string(),
            model_name: "GraphBert".to_string(),
            num_epoches: 2,
            learning_rate: 0.01,
            weight_decay: 5e-4,
            neg_sample_size: 1,
            neg_weight: 1.0,
            max_gradient_norm: 1.0,
            test_freq: 1,
            window_size: 3,
            strategy: TrainingStrategy::Supervised,
            min_time,
            max_time,
            force_regen: false,
            output_root: dir.join("out"),
            cache_dir: dir.join("cache"),
            encoder: EncoderConfig {
                dimensions: 8,
                hidden: 8,
                dropout: 0.0,
            },
        }
    }

    #[test]
    fn every_valid_time_step_gets_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let seq = sequence();
        let cache = EncodingCache::build_in_memory(&seq);
        let summary = run_all_time_steps(&config(dir.path(), 3, 4), &seq, &cache);
        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.failed(), 0);
        let steps: Vec<usize> = summary.records.iter().map(|(t, _)| *t).collect();
        assert_eq!(steps, vec![3, 4]);
    }

    #[test]
    fn a_failing_step_does_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let seq = sequence();
        let cache = EncodingCache::build_in_memory(&seq);
        // Time step 2 has only 2 prior snapshots for a window of 3.
        let summary = run_all_time_steps(&config(dir.path(), 2, 3), &seq, &cache);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.completed(), 1);
        assert_eq!(summary.failures[0].0, 2);
        let err = summary.failures[0].1.downcast_ref::<ForecastError>().unwrap();
        assert!(matches!(err, ForecastError::InsufficientHistory { .. }));
        assert_eq!(summary.records[0].0, 3);
    }
}
