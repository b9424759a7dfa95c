//! Graph-BERT style encoder, link-forecast loss, and optimizer
//!
//! The encoder combines a raw-feature projection with three structural
//! embedding tables (WL role, hop, position), propagates once over the
//! normalized adjacency, and applies a two-layer head. Gradients are exact
//! and hand-derived; the training loop owns when they are computed,
//! clipped, and applied.

use crate::encoding::{EncodingBundle, EncodingVocab};
use ndarray::{Array1, Array2, Axis, Dimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoder hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Embedding output dimensions.
    pub dimensions: usize,
    /// Hidden layer width.
    pub hidden: usize,
    /// Dropout on the hidden layer during training.
    pub dropout: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            hidden: 64,
            dropout: 0.1,
        }
    }
}

/// Every trainable tensor of the encoder. The same shape set serves as
/// parameters, gradients, and optimizer moments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamTensors {
    pub w_raw: Array2<f32>,
    pub e_role: Array2<f32>,
    pub e_hop: Array2<f32>,
    pub e_pos: Array2<f32>,
    pub w1: Array2<f32>,
    pub b1: Array1<f32>,
    pub w2: Array2<f32>,
    pub b2: Array1<f32>,
}

impl ParamTensors {
    pub fn zeros_like(&self) -> Self {
        Self {
            w_raw: Array2::zeros(self.w_raw.raw_dim()),
            e_role: Array2::zeros(self.e_role.raw_dim()),
            e_hop: Array2::zeros(self.e_hop.raw_dim()),
            e_pos: Array2::zeros(self.e_pos.raw_dim()),
            w1: Array2::zeros(self.w1.raw_dim()),
            b1: Array1::zeros(self.b1.raw_dim()),
            w2: Array2::zeros(self.w2.raw_dim()),
            b2: Array1::zeros(self.b2.raw_dim()),
        }
    }

    pub fn squared_norm(&self) -> f32 {
        let sq = |a: f32, x: &f32| a + x * x;
        self.w_raw.iter().fold(0.0, sq)
            + self.e_role.iter().fold(0.0, sq)
            + self.e_hop.iter().fold(0.0, sq)
            + self.e_pos.iter().fold(0.0, sq)
            + self.w1.iter().fold(0.0, sq)
            + self.b1.iter().fold(0.0, sq)
            + self.w2.iter().fold(0.0, sq)
            + self.b2.iter().fold(0.0, sq)
    }

    pub fn scale(&mut self, factor: f32) {
        self.w_raw.mapv_inplace(|x| x * factor);
        self.e_role.mapv_inplace(|x| x * factor);
        self.e_hop.mapv_inplace(|x| x * factor);
        self.e_pos.mapv_inplace(|x| x * factor);
        self.w1.mapv_inplace(|x| x * factor);
        self.b1.mapv_inplace(|x| x * factor);
        self.w2.mapv_inplace(|x| x * factor);
        self.b2.mapv_inplace(|x| x * factor);
    }
}

/// Intermediate activations kept for the backward pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Combined input embeddings before propagation.
    pub combined: Array2<f32>,
    /// After one propagation over the normalized adjacency.
    pub propagated: Array2<f32>,
    /// Pre-activation hidden layer.
    pub z1: Array2<f32>,
    /// Post-activation (and dropout) hidden layer.
    pub hidden: Array2<f32>,
    /// Inverted-dropout mask, present only in training mode.
    pub dropout_mask: Option<Array2<f32>>,
    /// The published embedding output, one row per node.
    pub out: Array2<f32>,
}

/// The encoder. Parameters are owned here; the training loop only triggers
/// updates and reads the embedding output.
pub struct GraphBertEncoder {
    pub config: EncoderConfig,
    model_id: Uuid,
    params: ParamTensors,
    training: bool,
    dropout_rng: StdRng,
}

impl GraphBertEncoder {
    /// Build the encoder with Xavier-style initialization, deterministic
    /// for a given seed.
    pub fn new(config: EncoderConfig, feature_dim: usize, vocab: EncodingVocab, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let d = config.dimensions;
        let h = config.hidden;
        let params = ParamTensors {
            w_raw: xavier(&mut rng, feature_dim, d),
            e_role: xavier(&mut rng, vocab.num_roles, d),
            e_hop: xavier(&mut rng, vocab.num_hops, d),
            e_pos: xavier(&mut rng, vocab.num_positions, d),
            w1: xavier(&mut rng, d, h),
            b1: Array1::zeros(h),
            w2: xavier(&mut rng, h, d),
            b2: Array1::zeros(d),
        };
        Self {
            config,
            model_id: Uuid::new_v4(),
            params,
            training: true,
            dropout_rng: StdRng::seed_from_u64(seed ^ 0xd0),
        }
    }

    pub fn model_id(&self) -> &Uuid {
        &self.model_id
    }

    pub fn train_mode(&mut self) {
        self.training = true;
    }

    pub fn eval_mode(&mut self) {
        self.training = false;
    }

    pub fn params(&self) -> &ParamTensors {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamTensors {
        &mut self.params
    }

    /// Replace the parameters, e.g. from a loaded checkpoint. Shapes must
    /// match the constructed encoder.
    pub fn set_params(&mut self, params: ParamTensors) {
        self.params = params;
    }

    /// Encode one snapshot and produce node embeddings.
    ///
    /// `features` is the snapshot's (row-normalized) feature matrix,
    /// `norm_adj` its GCN-normalized adjacency, and `bundle` the structural
    /// encodings for the same absolute time step.
    pub fn forward(
        &mut self,
        features: &Array2<f32>,
        norm_adj: &Array2<f32>,
        bundle: &EncodingBundle,
    ) -> ForwardPass {
        let num_nodes = features.nrows();
        let mut combined = features.dot(&self.params.w_raw);
        for i in 0..num_nodes {
            let mut row = combined.row_mut(i);
            row += &self.params.e_role.row(bundle.wl_roles[i]);
            row += &self.params.e_hop.row(bundle.hops[i]);
            row += &self.params.e_pos.row(bundle.positions[i]);
        }

        let propagated = norm_adj.dot(&combined);
        let z1 = propagated.dot(&self.params.w1) + &self.params.b1;
        let mut hidden = z1.mapv(|x| x.max(0.0));

        let dropout_mask = if self.training && self.config.dropout > 0.0 {
            let keep = 1.0 - self.config.dropout as f32;
            let mask = Array2::from_shape_fn(hidden.raw_dim(), |_| {
                if self.dropout_rng.gen_range(0.0..1.0f32) < keep {
                    1.0 / keep
                } else {
                    0.0
                }
            });
            hidden *= &mask;
            Some(mask)
        } else {
            None
        };

        let out = hidden.dot(&self.params.w2) + &self.params.b2;
        ForwardPass {
            combined,
            propagated,
            z1,
            hidden,
            dropout_mask,
            out,
        }
    }

    /// Exact gradients of the loss w.r.t. every parameter, given the loss
    /// gradient w.r.t. the embedding output.
    pub fn backward(
        &self,
        fwd: &ForwardPass,
        features: &Array2<f32>,
        norm_adj: &Array2<f32>,
        bundle: &EncodingBundle,
        d_out: &Array2<f32>,
    ) -> ParamTensors {
        let mut grads = self.params.zeros_like();

        grads.w2 = fwd.hidden.t().dot(d_out);
        grads.b2 = d_out.sum_axis(Axis(0));

        let mut d_z1 = d_out.dot(&self.params.w2.t());
        if let Some(mask) = &fwd.dropout_mask {
            d_z1 *= mask;
        }
        d_z1.zip_mut_with(&fwd.z1, |g, &z| {
            if z <= 0.0 {
                *g = 0.0;
            }
        });

        grads.w1 = fwd.propagated.t().dot(&d_z1);
        grads.b1 = d_z1.sum_axis(Axis(0));

        let d_propagated = d_z1.dot(&self.params.w1.t());
        let d_combined = norm_adj.t().dot(&d_propagated);

        grads.w_raw = features.t().dot(&d_combined);
        for i in 0..d_combined.nrows() {
            let row = d_combined.row(i);
            let mut role = grads.e_role.row_mut(bundle.wl_roles[i]);
            role += &row;
            let mut hop = grads.e_hop.row_mut(bundle.hops[i]);
            hop += &row;
            let mut pos = grads.e_pos.row_mut(bundle.positions[i]);
            pos += &row;
        }
        grads
    }
}

fn xavier(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f32> {
    let scale = (2.0 / (rows + cols) as f32).sqrt();
    Array2::from_shape_fn((rows, cols), |_| {
        rng.gen_range(0.0..1.0f32) * scale * 2.0 - scale
    })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable `ln(1 + e^x)`.
fn softplus(x: f32) -> f32 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Supervised link-forecast loss: binary cross-entropy with logits over
/// edge scores `s = out_u . out_v`, positives against negatives, the
/// negative class weighted by `neg_weight`. Returns the scalar loss and
/// its gradient w.r.t. the embedding output.
pub fn link_forecast_loss(
    out: &Array2<f32>,
    pos_edges: &[(usize, usize)],
    neg_edges: &[(usize, usize)],
    neg_weight: f32,
) -> (f32, Array2<f32>) {
    let mut d_out = Array2::zeros(out.raw_dim());
    if pos_edges.is_empty() && neg_edges.is_empty() {
        return (0.0, d_out);
    }

    let np = pos_edges.len().max(1) as f32;
    let nn = neg_edges.len().max(1) as f32;
    let mut loss = 0.0f32;

    for &(u, v) in pos_edges {
        let s: f32 = out.row(u).dot(&out.row(v));
        loss += softplus(-s) / np;
        let coeff = (sigmoid(s) - 1.0) / np;
        accumulate_edge_grad(&mut d_out, out, u, v, coeff);
    }
    for &(u, v) in neg_edges {
        let s: f32 = out.row(u).dot(&out.row(v));
        loss += neg_weight * softplus(s) / nn;
        let coeff = neg_weight * sigmoid(s) / nn;
        accumulate_edge_grad(&mut d_out, out, u, v, coeff);
    }
    (loss, d_out)
}

fn accumulate_edge_grad(
    d_out: &mut Array2<f32>,
    out: &Array2<f32>,
    u: usize,
    v: usize,
    coeff: f32,
) {
    let row_v = out.row(v).to_owned();
    let row_u = out.row(u).to_owned();
    d_out.row_mut(u).scaled_add(coeff, &row_v);
    d_out.row_mut(v).scaled_add(coeff, &row_u);
}

/// Clip the global gradient norm in place; returns the pre-clip norm.
pub fn clip_gradient_norm(grads: &mut ParamTensors, max_norm: f32) -> f32 {
    let total = grads.squared_norm().sqrt();
    if total > max_norm && total > 0.0 {
        grads.scale(max_norm / total);
    }
    total
}

/// Adam with decoupled-from-nothing L2 weight decay, matching the usual
/// `optim.Adam(lr, weight_decay)` behavior.
pub struct Adam {
    lr: f32,
    weight_decay: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m: ParamTensors,
    v: ParamTensors,
}

impl Adam {
    pub fn new(lr: f32, weight_decay: f32, params: &ParamTensors) -> Self {
        Self {
            lr,
            weight_decay,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: params.zeros_like(),
            v: params.zeros_like(),
        }
    }

    /// Apply one optimizer step.
    pub fn step(&mut self, params: &mut ParamTensors, grads: &ParamTensors) {
        self.t += 1;
        let scalars = AdamScalars {
            lr: self.lr,
            weight_decay: self.weight_decay,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            bias1: 1.0 - self.beta1.powi(self.t),
            bias2: 1.0 - self.beta2.powi(self.t),
        };

        adam_update(&mut params.w_raw, &grads.w_raw, &mut self.m.w_raw, &mut self.v.w_raw, scalars);
        adam_update(&mut params.e_role, &grads.e_role, &mut self.m.e_role, &mut self.v.e_role, scalars);
        adam_update(&mut params.e_hop, &grads.e_hop, &mut self.m.e_hop, &mut self.v.e_hop, scalars);
        adam_update(&mut params.e_pos, &grads.e_pos, &mut self.m.e_pos, &mut self.v.e_pos, scalars);
        adam_update(&mut params.w1, &grads.w1, &mut self.m.w1, &mut self.v.w1, scalars);
        adam_update(&mut params.b1, &grads.b1, &mut self.m.b1, &mut self.v.b1, scalars);
        adam_update(&mut params.w2, &grads.w2, &mut self.m.w2, &mut self.v.w2, scalars);
        adam_update(&mut params.b2, &grads.b2, &mut self.m.b2, &mut self.v.b2, scalars);
    }
}

#[derive(Clone, Copy)]
struct AdamScalars {
    lr: f32,
    weight_decay: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    bias1: f32,
    bias2: f32,
}

fn adam_update<D: Dimension>(
    param: &mut ndarray::Array<f32, D>,
    grad: &ndarray::Array<f32, D>,
    m: &mut ndarray::Array<f32, D>,
    v: &mut ndarray::Array<f32, D>,
    s: AdamScalars,
) {
    ndarray::Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            let g = g + s.weight_decay * *p;
            *m = s.beta1 * *m + (1.0 - s.beta1) * g;
            *v = s.beta2 * *v + (1.0 - s.beta2) * g * g;
            let m_hat = *m / s.bias1;
            let v_hat = *v / s.bias2;
            *p -= s.lr * m_hat / (v_hat.sqrt() + s.eps);
        });
}
