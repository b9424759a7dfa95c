//! Structural encoding generation and the per-time-step encoding cache
//!
//! Every snapshot gets a bundle of three per-node structural encodings
//! before training starts: Weisfeiler-Lehman role ids, hop distance to the
//! snapshot anchor, and intimacy-rank position. The encoder looks these up
//! by absolute time step on every forward pass, so a missing bundle is
//! fatal for that time step's run.

use crate::error::ForecastError;
use crate::graph::{GraphSequence, GraphSnapshot};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// WL refinement iterations. Two rounds separate roles up to
/// two-hop neighborhood structure, which is as deep as these snapshots
/// meaningfully support.
const WL_ITERATIONS: usize = 2;

/// Hop distances are capped; unreachable nodes get the cap.
const HOP_CAP: usize = 5;

/// Per-node structural encodings for one snapshot. Opaque to the training
/// loop; consumed by the encoder's embedding tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingBundle {
    /// Compact Weisfeiler-Lehman role id per node.
    pub wl_roles: Vec<usize>,
    /// BFS hop distance to the snapshot anchor, capped at [`HOP_CAP`].
    pub hops: Vec<usize>,
    /// Rank of the node in descending degree order (intimacy proxy).
    pub positions: Vec<usize>,
}

/// Embedding-table sizes needed to cover every bundle in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingVocab {
    pub num_roles: usize,
    pub num_hops: usize,
    pub num_positions: usize,
}

/// On-disk cache payload; the snapshot count guards against reusing a cache
/// built for a different cut of the dataset.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    dataset: String,
    num_nodes: usize,
    bundles: Vec<EncodingBundle>,
}

/// Precomputed encodings for the full sequence, keyed by absolute time
/// step. Read-only once built; shared by every time step's run.
#[derive(Debug)]
pub struct EncodingCache {
    bundles: Vec<EncodingBundle>,
}

impl EncodingCache {
    /// Build encodings for every snapshot, reading the on-disk cache when
    /// it matches the sequence and rewriting it otherwise.
    pub fn build(seq: &GraphSequence, cache_dir: &Path, force_regen: bool) -> Result<Self> {
        let cache_path = cache_dir.join(format!("encodings_{}.json", seq.dataset));

        if !force_regen && cache_path.exists() {
            let raw = fs::read_to_string(&cache_path)
                .with_context(|| format!("reading encoding cache {}", cache_path.display()))?;
            if let Ok(file) = serde_json::from_str::<CacheFile>(&raw) {
                if file.dataset == seq.dataset
                    && file.num_nodes == seq.num_nodes
                    && file.bundles.len() == seq.len()
                {
                    info!(
                        dataset = %seq.dataset,
                        snapshots = file.bundles.len(),
                        "loaded structural encodings from cache"
                    );
                    return Ok(Self {
                        bundles: file.bundles,
                    });
                }
            }
            debug!("encoding cache at {} is stale, rebuilding", cache_path.display());
        }

        let bundles: Vec<EncodingBundle> = seq
            .snapshots
            .iter()
            .map(|snapshot| encode_snapshot(snapshot, seq.num_nodes))
            .collect();

        fs::create_dir_all(cache_dir)
            .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;
        let file = CacheFile {
            dataset: seq.dataset.clone(),
            num_nodes: seq.num_nodes,
            bundles: bundles.clone(),
        };
        fs::write(&cache_path, serde_json::to_string(&file)?)
            .with_context(|| format!("writing encoding cache {}", cache_path.display()))?;
        info!(
            dataset = %seq.dataset,
            snapshots = bundles.len(),
            "built structural encodings"
        );

        Ok(Self { bundles })
    }

    /// Build without touching disk. Used by tests and by callers that
    /// manage caching themselves.
    pub fn build_in_memory(seq: &GraphSequence) -> Self {
        Self {
            bundles: seq
                .snapshots
                .iter()
                .map(|snapshot| encode_snapshot(snapshot, seq.num_nodes))
                .collect(),
        }
    }

    /// Bundle for an absolute time step.
    pub fn get(&self, time_step: usize) -> Result<&EncodingBundle, ForecastError> {
        self.bundles
            .get(time_step)
            .ok_or(ForecastError::MissingEncoding { time_step })
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Table sizes covering every bundle, so the encoder can size its
    /// embedding tables once per invocation.
    pub fn vocab_sizes(&self) -> EncodingVocab {
        let max_of = |f: fn(&EncodingBundle) -> &Vec<usize>| {
            self.bundles
                .iter()
                .flat_map(|b| f(b).iter().copied())
                .max()
                .unwrap_or(0)
        };
        EncodingVocab {
            num_roles: max_of(|b| &b.wl_roles) + 1,
            num_hops: max_of(|b| &b.hops) + 1,
            num_positions: max_of(|b| &b.positions) + 1,
        }
    }
}

/// Encode one snapshot. Isolated nodes get role from their (empty)
/// neighborhood, the hop cap, and the tail of the position ranking.
fn encode_snapshot(snapshot: &GraphSnapshot, num_nodes: usize) -> EncodingBundle {
    let adj = snapshot.neighbor_lists(num_nodes);
    let degrees = snapshot.degrees(num_nodes);
    EncodingBundle {
        wl_roles: wl_roles(&adj, &degrees),
        hops: hop_distances(&adj, &degrees),
        positions: degree_positions(&degrees),
    }
}

/// Iterated Weisfeiler-Lehman label refinement. Labels start from degree
/// and are refined by the sorted multiset of neighbor labels; signatures
/// are compacted to dense ids in sorted signature order, which keeps the
/// assignment deterministic across runs and platforms.
fn wl_roles(adj: &[Vec<usize>], degrees: &[usize]) -> Vec<usize> {
    let mut labels: Vec<usize> = degrees.to_vec();
    for _ in 0..WL_ITERATIONS {
        let signatures: Vec<(usize, Vec<usize>)> = adj
            .iter()
            .enumerate()
            .map(|(i, neighbors)| {
                let mut neighbor_labels: Vec<usize> =
                    neighbors.iter().map(|&n| labels[n]).collect();
                neighbor_labels.sort_unstable();
                (labels[i], neighbor_labels)
            })
            .collect();

        // Compact ids assigned in sorted signature order, so the labeling
        // does not depend on node order.
        let unique: BTreeSet<&(usize, Vec<usize>)> = signatures.iter().collect();
        let ordered: BTreeMap<&(usize, Vec<usize>), usize> = unique
            .into_iter()
            .enumerate()
            .map(|(id, sig)| (sig, id))
            .collect();
        labels = signatures.iter().map(|sig| ordered[sig]).collect();
    }
    labels
}

/// BFS hop distance from the snapshot anchor (highest-degree node, lowest
/// index on ties), capped at [`HOP_CAP`].
fn hop_distances(adj: &[Vec<usize>], degrees: &[usize]) -> Vec<usize> {
    let num_nodes = adj.len();
    let mut hops = vec![HOP_CAP; num_nodes];
    let anchor = match (0..num_nodes).max_by_key(|&i| (degrees[i], std::cmp::Reverse(i))) {
        Some(a) => a,
        None => return hops,
    };
    let mut queue = VecDeque::new();
    hops[anchor] = 0;
    queue.push_back(anchor);
    while let Some(u) = queue.pop_front() {
        if hops[u] >= HOP_CAP {
            continue;
        }
        for &v in &adj[u] {
            if hops[v] > hops[u] + 1 {
                hops[v] = hops[u] + 1;
                queue.push_back(v);
            }
        }
    }
    hops
}

/// Rank nodes by descending degree (ties by index): a cheap, deterministic
/// stand-in for the intimacy ordering.
fn degree_positions(degrees: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..degrees.len()).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(degrees[i]), i));
    let mut positions = vec![0usize; degrees.len()];
    for (rank, &node) in order.iter().enumerate() {
        positions[node] = rank;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSnapshot;

    fn star_sequence() -> GraphSequence {
        // Snapshot 0: star around node 0; snapshot 1: path 0-1-2-3
        GraphSequence {
            dataset: "star".to_string(),
            num_nodes: 4,
            snapshots: vec![
                GraphSnapshot::new(vec![(0, 1), (0, 2), (0, 3)]),
                GraphSnapshot::new(vec![(0, 1), (1, 2), (2, 3)]),
            ],
        }
    }

    #[test]
    fn wl_roles_separate_hub_from_leaves() {
        let cache = EncodingCache::build_in_memory(&star_sequence());
        let bundle = cache.get(0).unwrap();
        let hub = bundle.wl_roles[0];
        assert_ne!(hub, bundle.wl_roles[1]);
        // Leaves are structurally identical
        assert_eq!(bundle.wl_roles[1], bundle.wl_roles[2]);
        assert_eq!(bundle.wl_roles[2], bundle.wl_roles[3]);
    }

    #[test]
    fn hops_measure_distance_to_anchor() {
        let cache = EncodingCache::build_in_memory(&star_sequence());
        // Path snapshot: anchor is node 1 (degree 2, lowest index among ties)
        let bundle = cache.get(1).unwrap();
        assert_eq!(bundle.hops[1], 0);
        assert_eq!(bundle.hops[0], 1);
        assert_eq!(bundle.hops[2], 1);
        assert_eq!(bundle.hops[3], 2);
    }

    #[test]
    fn missing_time_step_is_an_error() {
        let cache = EncodingCache::build_in_memory(&star_sequence());
        assert!(matches!(
            cache.get(9),
            Err(ForecastError::MissingEncoding { time_step: 9 })
        ));
    }

    #[test]
    fn vocab_sizes_cover_all_bundles() {
        let cache = EncodingCache::build_in_memory(&star_sequence());
        let vocab = cache.vocab_sizes();
        for t in 0..cache.len() {
            let bundle = cache.get(t).unwrap();
            assert!(bundle.wl_roles.iter().all(|&r| r < vocab.num_roles));
            assert!(bundle.hops.iter().all(|&h| h < vocab.num_hops));
            assert!(bundle.positions.iter().all(|&p| p < vocab.num_positions));
        }
    }

    #[test]
    fn disk_cache_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let seq = star_sequence();
        let built = EncodingCache::build(&seq, dir.path(), false).unwrap();
        let reloaded = EncodingCache::build(&seq, dir.path(), false).unwrap();
        for t in 0..seq.len() {
            assert_eq!(built.get(t).unwrap(), reloaded.get(t).unwrap());
        }
    }

    #[test]
    fn encodings_are_deterministic() {
        let seq = star_sequence();
        let a = EncodingCache::build_in_memory(&seq);
        let b = EncodingCache::build_in_memory(&seq);
        for t in 0..seq.len() {
            assert_eq!(a.get(t).unwrap(), b.get(t).unwrap());
        }
    }
}
