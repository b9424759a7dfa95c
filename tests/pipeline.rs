//! End-to-end pipeline test on a tiny synthetic snapshot sequence.

use linkcast::config::{RunPaths, TrainConfig, TrainingStrategy};
use linkcast::driver::run_all_time_steps;
use linkcast::encoding::EncodingCache;
use linkcast::eval_data::build_evaluation_data;
use linkcast::graph::{GraphSequence, GraphSnapshot};
use linkcast::model::EncoderConfig;
use linkcast::npy::read_npy_f32;
use linkcast::persistence::{load_checkpoint, read_result_record};
use std::path::Path;

fn synthetic_sequence() -> GraphSequence {
    // Ring over 12 nodes accreting a few chords per step: 5 snapshots,
    // densifying over time like a growing contact network.
    let num_nodes = 12;
    let snapshots = (0..5)
        .map(|t| {
            let mut edges: Vec<(usize, usize)> =
                (0..num_nodes).map(|i| (i, (i + 1) % num_nodes)).collect();
            for c in 0..(2 * t) {
                edges.push((c % num_nodes, (c + 5) % num_nodes));
            }
            GraphSnapshot::new(edges)
        })
        .collect();
    GraphSequence {
        dataset: "toy".to_string(),
        num_nodes,
        snapshots,
    }
}

fn config(dir: &Path) -> TrainConfig {
    TrainConfig {
        seed: 123,
        dataset: "toy".to_string(),
        model_name: "GraphBert".to_string(),
        num_epoches: 6,
        learning_rate: 0.01,
        weight_decay: 5e-4,
        neg_sample_size: 2,
        neg_weight: 1.0,
        max_gradient_norm: 1.0,
        test_freq: 2,
        window_size: 3,
        strategy: TrainingStrategy::Supervised,
        min_time: 3,
        max_time: 4,
        force_regen: false,
        output_root: dir.join("runs"),
        cache_dir: dir.join("cache"),
        encoder: EncoderConfig {
            dimensions: 8,
            hidden: 8,
            dropout: 0.1,
        },
    }
}

#[test]
fn full_pipeline_persists_consistent_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let seq = synthetic_sequence();
    let cfg = config(dir.path());
    let cache = EncodingCache::build(&seq, &cfg.cache_dir, false).unwrap();

    let summary = run_all_time_steps(&cfg, &seq, &cache);
    assert_eq!(summary.completed(), 2);
    assert_eq!(summary.failed(), 0);

    for (time_step, record) in &summary.records {
        let paths = RunPaths::new(&cfg.output_root, &cfg.run_identity(*time_step));

        // The persisted record matches the returned one.
        let persisted = read_result_record(&paths.result_file).unwrap();
        assert_eq!(&persisted, record);

        // 6 epochs at cadence 2: three validation passes.
        assert_eq!(record.epoch_train_loss.len(), 6);
        assert_eq!(record.valid_epoch_auc.len(), 3);
        assert_eq!(record.test_epoch_auc.len(), 3);

        // Best epoch is the argmax of the validation history, first
        // occurrence on ties.
        let best = record.best_epoch;
        assert_eq!(record.best_valid_epoch_result, record.valid_epoch_auc[best]);
        assert_eq!(record.best_test_epoch_result, record.test_epoch_auc[best]);
        for (i, &auc) in record.valid_epoch_auc.iter().enumerate() {
            assert!(
                auc < record.valid_epoch_auc[best] || i >= best,
                "index {i} beats the selected best epoch"
            );
        }

        // Predictions artifact: one (score, label) row per validation edge.
        let eval_data =
            build_evaluation_data(&seq, *time_step, &cfg.cache_dir, false, cfg.seed).unwrap();
        let predictions = read_npy_f32(&paths.predictions_file).unwrap();
        assert_eq!(predictions.shape(), &[eval_data.val_size(), 2]);
        for row in predictions.rows() {
            assert!(row[0] >= 0.0 && row[0] <= 1.0, "score out of range");
            assert!(row[1] == 0.0 || row[1] == 1.0, "label not binary");
        }
        // Positives precede negatives in the artifact.
        for i in 0..eval_data.val_edges.len() {
            assert_eq!(predictions[[i, 1]], 1.0);
        }

        // Best checkpoint is loadable and shaped like the encoder.
        let checkpoint = load_checkpoint(&paths.checkpoint_file).unwrap();
        assert_eq!(checkpoint.params.w_raw.nrows(), seq.num_nodes);
        assert_eq!(checkpoint.params.w_raw.ncols(), cfg.encoder.dimensions);
        assert!(checkpoint.metadata.val_auc <= 1.0);
    }
}

#[test]
fn pipeline_is_deterministic_for_a_fixed_seed() {
    let seq = synthetic_sequence();

    let dir_a = tempfile::tempdir().unwrap();
    let cfg_a = config(dir_a.path());
    let cache_a = EncodingCache::build(&seq, &cfg_a.cache_dir, false).unwrap();
    let summary_a = run_all_time_steps(&cfg_a, &seq, &cache_a);

    let dir_b = tempfile::tempdir().unwrap();
    let cfg_b = config(dir_b.path());
    let cache_b = EncodingCache::build(&seq, &cfg_b.cache_dir, false).unwrap();
    let summary_b = run_all_time_steps(&cfg_b, &seq, &cache_b);

    assert_eq!(summary_a.completed(), summary_b.completed());
    for ((step_a, rec_a), (step_b, rec_b)) in
        summary_a.records.iter().zip(summary_b.records.iter())
    {
        assert_eq!(step_a, step_b);
        assert_eq!(rec_a, rec_b, "records diverged at time step {step_a}");
    }
}

#[test]
fn changing_the_seed_changes_the_trajectory() {
    let seq = synthetic_sequence();

    let dir_a = tempfile::tempdir().unwrap();
    let cfg_a = config(dir_a.path());
    let cache_a = EncodingCache::build(&seq, &cfg_a.cache_dir, false).unwrap();
    let summary_a = run_all_time_steps(&cfg_a, &seq, &cache_a);

    let dir_b = tempfile::tempdir().unwrap();
    let mut cfg_b = config(dir_b.path());
    cfg_b.seed = 456;
    let cache_b = EncodingCache::build(&seq, &cfg_b.cache_dir, false).unwrap();
    let summary_b = run_all_time_steps(&cfg_b, &seq, &cache_b);

    let loss_a = &summary_a.records[0].1.epoch_train_loss;
    let loss_b = &summary_b.records[0].1.epoch_train_loss;
    assert_ne!(loss_a, loss_b, "different seeds produced identical losses");
}
