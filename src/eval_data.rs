//! Train/val/test edge sets for link prediction at one time step
//!
//! Positives are the evaluation snapshot's edges, shuffled and split
//! 20/20/60 into train/val/test; each split gets an equal number of
//! sampled negative (non-existent) pairs. The result is cached on disk and
//! regenerated only when the cache is absent or `force_regen` is set.

use crate::error::ForecastError;
use crate::graph::GraphSequence;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const VAL_FRACTION: f64 = 0.2;
const TEST_FRACTION: f64 = 0.6;

/// Positive and negative ("false") edges per split. Immutable after
/// construction for a given time step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationData {
    pub train_edges: Vec<(usize, usize)>,
    pub train_edges_false: Vec<(usize, usize)>,
    pub val_edges: Vec<(usize, usize)>,
    pub val_edges_false: Vec<(usize, usize)>,
    pub test_edges: Vec<(usize, usize)>,
    pub test_edges_false: Vec<(usize, usize)>,
}

impl EvaluationData {
    /// Validation split size, positives plus negatives: the row count of
    /// the persisted predictions artifact.
    pub fn val_size(&self) -> usize {
        self.val_edges.len() + self.val_edges_false.len()
    }
}

/// Build (or load from cache) the evaluation edge sets for `time_step`.
pub fn build_evaluation_data(
    seq: &GraphSequence,
    time_step: usize,
    cache_dir: &Path,
    force_regen: bool,
    seed: u64,
) -> Result<EvaluationData, ForecastError> {
    let fail = |reason: String| ForecastError::EvaluationData {
        time_step,
        dataset: seq.dataset.clone(),
        reason,
    };

    let cache_path = cache_dir.join(format!("evaldata_{}_t{}.json", seq.dataset, time_step));
    if !force_regen && cache_path.exists() {
        let raw = fs::read_to_string(&cache_path)
            .map_err(|e| fail(format!("reading cache {}: {e}", cache_path.display())))?;
        if let Ok(data) = serde_json::from_str::<EvaluationData>(&raw) {
            debug!(time_step, "loaded evaluation edge sets from cache");
            return Ok(data);
        }
        debug!(time_step, "evaluation edge cache is stale, rebuilding");
    }

    let snapshot = seq
        .snapshot(time_step)
        .ok_or_else(|| fail(format!("no snapshot at time step {time_step}")))?;
    let mut positives = snapshot.undirected_edges();
    if positives.len() < 3 {
        return Err(fail(format!(
            "snapshot has {} edges, need at least 3 to split",
            positives.len()
        )));
    }

    // Deterministic per (seed, time step) so cached and regenerated sets agree.
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add((time_step as u64) * 0x9e37_79b9));
    positives.shuffle(&mut rng);

    let n = positives.len();
    let n_val = ((n as f64 * VAL_FRACTION) as usize).max(1);
    let n_test = ((n as f64 * TEST_FRACTION) as usize).max(1);
    if n_val + n_test >= n {
        return Err(fail(format!(
            "split of {n} edges leaves no training positives"
        )));
    }

    let val_edges = positives[..n_val].to_vec();
    let test_edges = positives[n_val..n_val + n_test].to_vec();
    let train_edges = positives[n_val + n_test..].to_vec();

    let edge_set: HashSet<(usize, usize)> = positives.iter().copied().collect();
    let mut taken = HashSet::new();
    let mut sample_split = |count: usize, rng: &mut StdRng| -> Result<Vec<(usize, usize)>, ForecastError> {
        sample_negatives(count, seq.num_nodes, &edge_set, &mut taken, rng)
            .map_err(|reason| fail(reason))
    };

    let val_edges_false = sample_split(val_edges.len(), &mut rng)?;
    let test_edges_false = sample_split(test_edges.len(), &mut rng)?;
    let train_edges_false = sample_split(train_edges.len(), &mut rng)?;

    let data = EvaluationData {
        train_edges,
        train_edges_false,
        val_edges,
        val_edges_false,
        test_edges,
        test_edges_false,
    };

    fs::create_dir_all(cache_dir)
        .map_err(|e| fail(format!("creating cache dir {}: {e}", cache_dir.display())))?;
    let encoded = serde_json::to_string(&data)
        .map_err(|e| fail(format!("encoding evaluation edge sets: {e}")))?;
    fs::write(&cache_path, encoded)
        .map_err(|e| fail(format!("writing cache {}: {e}", cache_path.display())))?;
    info!(
        time_step,
        train = data.train_edges.len(),
        val = data.val_edges.len(),
        test = data.test_edges.len(),
        "built evaluation edge sets"
    );

    Ok(data)
}

/// Sample `count` distinct non-edges, disjoint from every split sampled so
/// far. Bounded attempts: a near-complete graph is an error, not a hang.
fn sample_negatives(
    count: usize,
    num_nodes: usize,
    edge_set: &HashSet<(usize, usize)>,
    taken: &mut HashSet<(usize, usize)>,
    rng: &mut StdRng,
) -> Result<Vec<(usize, usize)>, String> {
    let mut out = Vec::with_capacity(count);
    let max_attempts = count.saturating_mul(200).max(1);
    let mut attempts = 0usize;
    while out.len() < count {
        if attempts >= max_attempts {
            return Err(format!(
                "could not sample {count} negative edges (graph too dense?)"
            ));
        }
        attempts += 1;
        let u = rng.gen_range(0..num_nodes);
        let v = rng.gen_range(0..num_nodes);
        if u == v {
            continue;
        }
        let key = (u.min(v), u.max(v));
        if edge_set.contains(&key) || !taken.insert(key) {
            continue;
        }
        out.push(key);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSnapshot;

    fn sequence() -> GraphSequence {
        let edges: Vec<(usize, usize)> = (0..10).map(|i| (i, (i + 1) % 12)).collect();
        GraphSequence {
            dataset: "ring".to_string(),
            num_nodes: 12,
            snapshots: vec![GraphSnapshot::new(edges)],
        }
    }

    #[test]
    fn splits_partition_the_positives() {
        let dir = tempfile::tempdir().unwrap();
        let data = build_evaluation_data(&sequence(), 0, dir.path(), false, 1).unwrap();
        let total = data.train_edges.len() + data.val_edges.len() + data.test_edges.len();
        assert_eq!(total, 10);
        assert_eq!(data.val_edges.len(), 2);
        assert_eq!(data.test_edges.len(), 6);
        assert_eq!(data.train_edges.len(), 2);
        // Negatives mirror the positive counts
        assert_eq!(data.val_edges_false.len(), data.val_edges.len());
        assert_eq!(data.test_edges_false.len(), data.test_edges.len());
        assert_eq!(data.train_edges_false.len(), data.train_edges.len());
    }

    #[test]
    fn negatives_are_disjoint_from_positives_and_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let data = build_evaluation_data(&sequence(), 0, dir.path(), false, 1).unwrap();
        let positives: HashSet<_> = sequence().snapshots[0].edge_set();
        let mut all_neg = HashSet::new();
        for edge in data
            .train_edges_false
            .iter()
            .chain(&data.val_edges_false)
            .chain(&data.test_edges_false)
        {
            assert!(!positives.contains(edge));
            assert!(all_neg.insert(*edge), "duplicate negative {edge:?}");
        }
    }

    #[test]
    fn cache_is_reused_and_force_regen_matches() {
        let dir = tempfile::tempdir().unwrap();
        let seq = sequence();
        let first = build_evaluation_data(&seq, 0, dir.path(), false, 9).unwrap();
        let cached = build_evaluation_data(&seq, 0, dir.path(), false, 9).unwrap();
        assert_eq!(first, cached);
        // Same seed, so regeneration reproduces the cached sets
        let regen = build_evaluation_data(&seq, 0, dir.path(), true, 9).unwrap();
        assert_eq!(first, regen);
    }

    #[test]
    fn too_few_edges_is_an_evaluation_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let seq = GraphSequence {
            dataset: "tiny".to_string(),
            num_nodes: 4,
            snapshots: vec![GraphSnapshot::new(vec![(0, 1)])],
        };
        let err = build_evaluation_data(&seq, 0, dir.path(), false, 1).unwrap_err();
        assert!(matches!(err, ForecastError::EvaluationData { .. }));
    }
}
