//! Link-prediction evaluation
//!
//! Two scoring functions over a pair of node embeddings:
//!
//! - **HAD**: a logistic classifier over Hadamard-product edge features,
//!   fit on the train split each time the evaluator runs;
//! - **SIGMOID**: the sigmoid of the raw embedding dot product.
//!
//! Both are summarized per split with rank-based ROC AUC. Source and
//! target embeddings are passed separately so a bipartite caller could
//! supply two spaces; this pipeline passes the same matrix twice.

use crate::eval_data::EvaluationData;
use ndarray::{Array1, Array2};

/// Logistic-regression fitting schedule for the HAD scorer. Deterministic:
/// zero initialization, fixed step count.
const HAD_ITERATIONS: usize = 200;
const HAD_LEARNING_RATE: f32 = 0.5;

/// One scorer's outcome: per-split AUC plus the validation scores paired
/// with their ground-truth labels, one `(score, label)` row per edge.
#[derive(Debug, Clone)]
pub struct ScorerReport {
    pub val_auc: f64,
    pub test_auc: f64,
    pub val_pred_true: Array2<f32>,
}

/// Evaluation outcome for both scorers.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub had: ScorerReport,
    pub sigmoid: ScorerReport,
}

/// Score every split of `data` against the embeddings.
pub fn evaluate_link_prediction(
    data: &EvaluationData,
    emb_src: &Array2<f32>,
    emb_dst: &Array2<f32>,
) -> EvalReport {
    let had = had_report(data, emb_src, emb_dst);
    let sigmoid = sigmoid_report(data, emb_src, emb_dst);
    EvalReport { had, sigmoid }
}

fn had_report(data: &EvaluationData, emb_src: &Array2<f32>, emb_dst: &Array2<f32>) -> ScorerReport {
    let dims = emb_src.ncols();
    let hadamard = |edges: &[(usize, usize)]| -> Vec<Array1<f32>> {
        edges
            .iter()
            .map(|&(u, v)| (&emb_src.row(u) * &emb_dst.row(v)).to_owned())
            .collect()
    };

    let train_pos = hadamard(&data.train_edges);
    let train_neg = hadamard(&data.train_edges_false);

    // Full-batch logistic regression on the train split.
    let mut weights = Array1::<f32>::zeros(dims);
    let mut bias = 0.0f32;
    let n = (train_pos.len() + train_neg.len()).max(1) as f32;
    for _ in 0..HAD_ITERATIONS {
        let mut d_weights = Array1::<f32>::zeros(dims);
        let mut d_bias = 0.0f32;
        for (features, label) in train_pos
            .iter()
            .map(|f| (f, 1.0f32))
            .chain(train_neg.iter().map(|f| (f, 0.0f32)))
        {
            let err = sigmoid(weights.dot(features) + bias) - label;
            d_weights.scaled_add(err / n, features);
            d_bias += err / n;
        }
        weights.scaled_add(-HAD_LEARNING_RATE, &d_weights);
        bias -= HAD_LEARNING_RATE * d_bias;
    }

    let score_split = |pos: &[(usize, usize)], neg: &[(usize, usize)]| {
        let pos_features = hadamard(pos);
        let neg_features = hadamard(neg);
        let scores: Vec<f64> = pos_features
            .iter()
            .chain(neg_features.iter())
            .map(|f| sigmoid(weights.dot(f) + bias) as f64)
            .collect();
        let labels: Vec<bool> = std::iter::repeat(true)
            .take(pos.len())
            .chain(std::iter::repeat(false).take(neg.len()))
            .collect();
        (scores, labels)
    };

    let (val_scores, val_labels) = score_split(&data.val_edges, &data.val_edges_false);
    let (test_scores, test_labels) = score_split(&data.test_edges, &data.test_edges_false);

    ScorerReport {
        val_auc: roc_auc(&val_scores, &val_labels),
        test_auc: roc_auc(&test_scores, &test_labels),
        val_pred_true: pred_true_matrix(&val_scores, &val_labels),
    }
}

fn sigmoid_report(
    data: &EvaluationData,
    emb_src: &Array2<f32>,
    emb_dst: &Array2<f32>,
) -> ScorerReport {
    let score_split = |pos: &[(usize, usize)], neg: &[(usize, usize)]| {
        let dot = |edges: &[(usize, usize)]| -> Vec<f64> {
            edges
                .iter()
                .map(|&(u, v)| sigmoid(emb_src.row(u).dot(&emb_dst.row(v))) as f64)
                .collect()
        };
        let scores: Vec<f64> = dot(pos).into_iter().chain(dot(neg)).collect();
        let labels: Vec<bool> = std::iter::repeat(true)
            .take(pos.len())
            .chain(std::iter::repeat(false).take(neg.len()))
            .collect();
        (scores, labels)
    };

    let (val_scores, val_labels) = score_split(&data.val_edges, &data.val_edges_false);
    let (test_scores, test_labels) = score_split(&data.test_edges, &data.test_edges_false);

    ScorerReport {
        val_auc: roc_auc(&val_scores, &val_labels),
        test_auc: roc_auc(&test_scores, &test_labels),
        val_pred_true: pred_true_matrix(&val_scores, &val_labels),
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn pred_true_matrix(scores: &[f64], labels: &[bool]) -> Array2<f32> {
    let mut out = Array2::zeros((scores.len(), 2));
    for (i, (&score, &label)) in scores.iter().zip(labels.iter()).enumerate() {
        out[[i, 0]] = score as f32;
        out[[i, 1]] = if label { 1.0 } else { 0.0 };
    }
    out
}

/// Rank-based ROC AUC with average ranks for tied scores. Degenerate
/// inputs (a single class) score 0.5.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> f64 {
    let num_pos = labels.iter().filter(|&&l| l).count();
    let num_neg = labels.len() - num_pos;
    if num_pos == 0 || num_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Average rank over the tie run, 1-indexed
        let rank = (i + 1 + j + 1) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(ranks.iter())
        .filter(|(&l, _)| l)
        .map(|(_, &r)| r)
        .sum();
    let np = num_pos as f64;
    let nn = num_neg as f64;
    (pos_rank_sum - np * (np + 1.0) / 2.0) / (np * nn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auc_on_perfect_ranking_is_one() {
        let scores = vec![0.9, 0.8, 0.2, 0.1];
        let labels = vec![true, true, false, false];
        assert!((roc_auc(&scores, &labels) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn auc_on_inverted_ranking_is_zero() {
        let scores = vec![0.1, 0.2, 0.8, 0.9];
        let labels = vec![true, true, false, false];
        assert!(roc_auc(&scores, &labels).abs() < 1e-12);
    }

    #[test]
    fn auc_with_all_tied_scores_is_half() {
        let scores = vec![0.5; 6];
        let labels = vec![true, false, true, false, true, false];
        assert!((roc_auc(&scores, &labels) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn auc_degenerate_single_class_is_half() {
        assert_eq!(roc_auc(&[0.3, 0.7], &[true, true]), 0.5);
    }

    fn separable_fixture() -> (EvaluationData, Array2<f32>) {
        // Nodes 0..4 in cluster A (+1 on dim 0), nodes 4..8 in cluster B
        // (-1 on dim 0). Within-cluster pairs are positives, cross-cluster
        // pairs negatives, so the Hadamard dim-0 feature separates them.
        let mut emb = Array2::<f32>::zeros((8, 2));
        for i in 0..8 {
            emb[[i, 0]] = if i < 4 { 1.0 } else { -1.0 };
            emb[[i, 1]] = 0.5;
        }
        let data = EvaluationData {
            train_edges: vec![(0, 1), (4, 5)],
            train_edges_false: vec![(0, 4), (1, 5)],
            val_edges: vec![(2, 3), (6, 7)],
            val_edges_false: vec![(2, 6), (3, 7)],
            test_edges: vec![(0, 2), (4, 6)],
            test_edges_false: vec![(0, 5), (2, 4)],
        };
        (data, emb)
    }

    #[test]
    fn had_classifier_separates_separable_clusters() {
        let (data, emb) = separable_fixture();
        let report = evaluate_link_prediction(&data, &emb, &emb);
        assert!((report.had.val_auc - 1.0).abs() < 1e-9, "val {}", report.had.val_auc);
        assert!((report.had.test_auc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sigmoid_scorer_separates_separable_clusters() {
        let (data, emb) = separable_fixture();
        let report = evaluate_link_prediction(&data, &emb, &emb);
        // Within-cluster dot = 1.25, cross-cluster dot = -0.75
        assert!((report.sigmoid.val_auc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pred_true_rows_pair_scores_with_labels() {
        let (data, emb) = separable_fixture();
        let report = evaluate_link_prediction(&data, &emb, &emb);
        let pt = &report.had.val_pred_true;
        assert_eq!(pt.shape(), &[4, 2]);
        // Positives first, then negatives
        assert_eq!(pt[[0, 1]], 1.0);
        assert_eq!(pt[[1, 1]], 1.0);
        assert_eq!(pt[[2, 1]], 0.0);
        assert_eq!(pt[[3, 1]], 0.0);
        // Scores are probabilities
        for i in 0..4 {
            assert!(pt[[i, 0]] >= 0.0 && pt[[i, 0]] <= 1.0);
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        let (data, emb) = separable_fixture();
        let a = evaluate_link_prediction(&data, &emb, &emb);
        let b = evaluate_link_prediction(&data, &emb, &emb);
        assert_eq!(a.had.val_auc, b.had.val_auc);
        assert_eq!(a.had.val_pred_true, b.had.val_pred_true);
        assert_eq!(a.sigmoid.test_auc, b.sigmoid.test_auc);
    }
}
