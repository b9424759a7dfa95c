//! Minibatch iteration over training snapshots
//!
//! One minibatch is one training snapshot's positive edges plus freshly
//! sampled negatives. Each call to [`MinibatchIterator::shuffle`] starts a
//! new epoch-order traversal in which every snapshot is visited exactly
//! once before [`MinibatchIterator::end`] reports true.

use crate::graph::GraphSnapshot;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// One training batch: the visited snapshot's range within the window
/// (`window_end - 1` is its offset) and its positive/negative edges.
#[derive(Debug, Clone)]
pub struct Minibatch {
    pub window_start: usize,
    pub window_end: usize,
    pub pos_edges: Vec<(usize, usize)>,
    pub neg_edges: Vec<(usize, usize)>,
}

/// Cursor over the shuffled training snapshots of one window. Owns its
/// seeded RNG, so traversal order and negative samples are reproducible
/// for a given seed while still varying across epochs.
pub struct MinibatchIterator {
    num_nodes: usize,
    neg_sample_size: usize,
    pos_edges: Vec<Vec<(usize, usize)>>,
    edge_sets: Vec<HashSet<(usize, usize)>>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl MinibatchIterator {
    pub fn new(
        snapshots: &[GraphSnapshot],
        num_nodes: usize,
        neg_sample_size: usize,
        seed: u64,
    ) -> Self {
        let pos_edges: Vec<Vec<(usize, usize)>> =
            snapshots.iter().map(|s| s.undirected_edges()).collect();
        let edge_sets: Vec<HashSet<(usize, usize)>> =
            pos_edges.iter().map(|e| e.iter().copied().collect()).collect();
        let order: Vec<usize> = (0..snapshots.len()).collect();
        Self {
            num_nodes,
            neg_sample_size,
            pos_edges,
            edge_sets,
            order,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Start a new epoch: reshuffle the traversal order and rewind.
    pub fn shuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }

    /// True once every snapshot of the current traversal has been yielded.
    pub fn end(&self) -> bool {
        self.cursor >= self.order.len()
    }

    /// Yield the next snapshot's batch, or `None` at end of epoch.
    pub fn next_minibatch(&mut self) -> Option<Minibatch> {
        if self.end() {
            return None;
        }
        let idx = self.order[self.cursor];
        self.cursor += 1;

        let pos_edges = self.pos_edges[idx].clone();
        let neg_edges = self.sample_negatives(idx, &pos_edges);
        Some(Minibatch {
            window_start: idx,
            window_end: idx + 1,
            pos_edges,
            neg_edges,
        })
    }

    /// Rewind the cursor for the evaluation pass without consuming epoch
    /// progress or reshuffling.
    pub fn test_reset(&mut self) {
        self.cursor = 0;
    }

    /// Corrupt one endpoint of a positive edge, keeping the result off the
    /// snapshot's edge set. Bounded attempts: a near-complete snapshot
    /// yields fewer negatives rather than looping forever.
    fn sample_negatives(
        &mut self,
        snapshot_idx: usize,
        pos_edges: &[(usize, usize)],
    ) -> Vec<(usize, usize)> {
        let wanted = pos_edges.len() * self.neg_sample_size;
        let mut negatives = Vec::with_capacity(wanted);
        let mut attempts = 0usize;
        let max_attempts = wanted.saturating_mul(20).max(1);

        while negatives.len() < wanted && attempts < max_attempts {
            attempts += 1;
            let &(u, v) = &pos_edges[self.rng.gen_range(0..pos_edges.len())];
            let replacement = self.rng.gen_range(0..self.num_nodes);
            let (a, b) = if self.rng.gen_bool(0.5) {
                (replacement, v)
            } else {
                (u, replacement)
            };
            if a == b {
                continue;
            }
            let key = (a.min(b), a.max(b));
            if !self.edge_sets[snapshot_idx].contains(&key) {
                negatives.push(key);
            }
        }
        negatives
    }
}
