//! Graph snapshot sequences and tensor preprocessing
//!
//! A dataset is a sequence of undirected graph snapshots over a shared node
//! universe, loaded once and treated as read-only for the rest of the
//! invocation.

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One graph in the temporal sequence. Edges are undirected; both
/// orientations and duplicates are tolerated in the input and collapsed by
/// the accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub edges: Vec<(usize, usize)>,
}

impl GraphSnapshot {
    pub fn new(edges: Vec<(usize, usize)>) -> Self {
        Self { edges }
    }

    /// Deduplicated undirected edges with `u < v`, self-loops dropped,
    /// in first-seen order.
    pub fn undirected_edges(&self) -> Vec<(usize, usize)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &(u, v) in &self.edges {
            if u == v {
                continue;
            }
            let key = (u.min(v), u.max(v));
            if seen.insert(key) {
                out.push(key);
            }
        }
        out
    }

    /// Canonical edge set for membership tests.
    pub fn edge_set(&self) -> HashSet<(usize, usize)> {
        self.undirected_edges().into_iter().collect()
    }

    /// Per-node degree over the canonical edges.
    pub fn degrees(&self, num_nodes: usize) -> Vec<usize> {
        let mut deg = vec![0usize; num_nodes];
        for (u, v) in self.undirected_edges() {
            deg[u] += 1;
            deg[v] += 1;
        }
        deg
    }

    /// Sorted adjacency lists over the canonical edges.
    pub fn neighbor_lists(&self, num_nodes: usize) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); num_nodes];
        for (u, v) in self.undirected_edges() {
            adj[u].push(v);
            adj[v].push(u);
        }
        for list in &mut adj {
            list.sort_unstable();
        }
        adj
    }
}

/// The global snapshot sequence for a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSequence {
    pub dataset: String,
    pub num_nodes: usize,
    pub snapshots: Vec<GraphSnapshot>,
}

impl GraphSequence {
    /// Load a sequence from its JSON file and validate edge endpoints
    /// against the node universe.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading graph sequence {}", path.display()))?;
        let seq: GraphSequence = serde_json::from_str(&raw)
            .with_context(|| format!("parsing graph sequence {}", path.display()))?;
        seq.validate()?;
        Ok(seq)
    }

    fn validate(&self) -> Result<()> {
        if self.snapshots.is_empty() {
            bail!("dataset '{}' has no snapshots", self.dataset);
        }
        for (t, snapshot) in self.snapshots.iter().enumerate() {
            for &(u, v) in &snapshot.edges {
                if u >= self.num_nodes || v >= self.num_nodes {
                    bail!(
                        "dataset '{}': edge ({}, {}) at snapshot {} outside node universe of {}",
                        self.dataset,
                        u,
                        v,
                        t,
                        self.num_nodes
                    );
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshot(&self, t: usize) -> Option<&GraphSnapshot> {
        self.snapshots.get(t)
    }
}

/// Symmetric GCN normalization `D^-1/2 (A + I) D^-1/2` as a dense matrix.
pub fn normalize_adjacency_gcn(snapshot: &GraphSnapshot, num_nodes: usize) -> Array2<f32> {
    let mut adj = Array2::<f32>::eye(num_nodes);
    for (u, v) in snapshot.undirected_edges() {
        adj[[u, v]] = 1.0;
        adj[[v, u]] = 1.0;
    }
    let inv_sqrt_deg: Vec<f32> = (0..num_nodes)
        .map(|i| {
            let d: f32 = adj.row(i).sum();
            1.0 / d.sqrt()
        })
        .collect();
    for i in 0..num_nodes {
        for j in 0..num_nodes {
            adj[[i, j]] *= inv_sqrt_deg[i] * inv_sqrt_deg[j];
        }
    }
    adj
}

/// One-hot node features over the shared universe, row-normalized. With
/// one-hot rows the normalization is the identity, but the call site keeps
/// the same shape as any richer feature source would need.
pub fn one_hot_features(num_nodes: usize) -> Array2<f32> {
    row_normalize(Array2::eye(num_nodes))
}

/// Row-normalize a feature matrix so each row sums to one. All-zero rows
/// stay zero.
pub fn row_normalize(mut features: Array2<f32>) -> Array2<f32> {
    for mut row in features.rows_mut() {
        let sum: f32 = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|x| x / sum);
        }
    }
    features
}
