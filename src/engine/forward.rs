//! Single-token llama forward pass over the memory-mapped weights.

use super::ops::{dot, matvec, rms_norm, rope, silu, softmax};
use super::tokenizer::TokenId;
use crate::models::Model;

/// Key/value cache, laid out `[layer][position][kv_dim]`.
pub(crate) struct KvCache {
    keys: Vec<f32>,
    values: Vec<f32>,
    capacity: usize,
    kv_dim: usize,
}

impl KvCache {
    /// Reserve the full cache up front. Returns the byte count on failure.
    pub(crate) fn allocate(n_layer: usize, capacity: usize, kv_dim: usize) -> Result<Self, usize> {
        let per_tensor = n_layer
            .checked_mul(capacity)
            .and_then(|n| n.checked_mul(kv_dim))
            .ok_or(usize::MAX)?;
        let bytes = per_tensor.saturating_mul(2 * std::mem::size_of::<f32>());

        let mut keys = Vec::new();
        let mut values = Vec::new();
        keys.try_reserve_exact(per_tensor).map_err(|_| bytes)?;
        values.try_reserve_exact(per_tensor).map_err(|_| bytes)?;
        keys.resize(per_tensor, 0.0);
        values.resize(per_tensor, 0.0);

        Ok(Self { keys, values, capacity, kv_dim })
    }

    pub(crate) fn size_bytes(&self) -> usize {
        (self.keys.len() + self.values.len()) * std::mem::size_of::<f32>()
    }

    fn slot(&self, layer: usize, pos: usize) -> std::ops::Range<usize> {
        let start = (layer * self.capacity + pos) * self.kv_dim;
        start..start + self.kv_dim
    }

    fn key(&self, layer: usize, pos: usize) -> &[f32] {
        &self.keys[self.slot(layer, pos)]
    }

    fn value(&self, layer: usize, pos: usize) -> &[f32] {
        &self.values[self.slot(layer, pos)]
    }

    fn store(&mut self, layer: usize, pos: usize, k: &[f32], v: &[f32]) {
        let slot = self.slot(layer, pos);
        self.keys[slot.clone()].copy_from_slice(k);
        self.values[slot].copy_from_slice(v);
    }
}

/// Activation buffers reused across tokens.
pub(crate) struct Scratch {
    x: Vec<f32>,
    xb: Vec<f32>,
    xb2: Vec<f32>,
    q: Vec<f32>,
    k: Vec<f32>,
    v: Vec<f32>,
    att: Vec<f32>,
    gate: Vec<f32>,
    up: Vec<f32>,
    pub(crate) logits: Vec<f32>,
}

impl Scratch {
    pub(crate) fn new(model: &Model, capacity: usize) -> Self {
        let hp = model.hparams();
        Self {
            x: vec![0.0; hp.n_embd],
            xb: vec![0.0; hp.n_embd],
            xb2: vec![0.0; hp.n_embd],
            q: vec![0.0; hp.n_embd],
            k: vec![0.0; hp.kv_dim()],
            v: vec![0.0; hp.kv_dim()],
            att: vec![0.0; capacity],
            gate: vec![0.0; hp.n_ff],
            up: vec![0.0; hp.n_ff],
            logits: vec![0.0; hp.n_vocab],
        }
    }
}

/// Run `token` at `pos`, writing its keys/values into the cache.
///
/// Logits are only computed when `want_logits` is set; intermediate prompt
/// tokens skip the output projection.
pub(crate) fn forward(
    model: &Model,
    cache: &mut KvCache,
    s: &mut Scratch,
    token: TokenId,
    pos: usize,
    n_threads: usize,
    want_logits: bool,
) {
    let hp = model.hparams();
    let w = model.weights();
    let data = model.data();
    let head_dim = hp.head_dim();
    let group = hp.n_head / hp.n_head_kv;
    let scale = 1.0 / (head_dim as f32).sqrt();

    w.token_embd.dequantize_row(data, token as usize, &mut s.x);

    for (l, layer) in w.layers.iter().enumerate() {
        // Attention
        rms_norm(&s.x, &layer.attn_norm, hp.rms_eps, &mut s.xb);
        matvec(&layer.wq, data, &s.xb, &mut s.q, n_threads);
        matvec(&layer.wk, data, &s.xb, &mut s.k, n_threads);
        matvec(&layer.wv, data, &s.xb, &mut s.v, n_threads);
        rope(&mut s.q, pos, head_dim, hp.rope_freq_base);
        rope(&mut s.k, pos, head_dim, hp.rope_freq_base);
        cache.store(l, pos, &s.k, &s.v);

        for h in 0..hp.n_head {
            let kv_off = (h / group) * head_dim;
            let q = &s.q[h * head_dim..(h + 1) * head_dim];
            let att = &mut s.att[..=pos];
            for (t, a) in att.iter_mut().enumerate() {
                *a = dot(q, &cache.key(l, t)[kv_off..kv_off + head_dim]) * scale;
            }
            softmax(att);

            let out = &mut s.xb2[h * head_dim..(h + 1) * head_dim];
            out.fill(0.0);
            for (t, &a) in att.iter().enumerate() {
                let v = &cache.value(l, t)[kv_off..kv_off + head_dim];
                for (o, v) in out.iter_mut().zip(v) {
                    *o += a * v;
                }
            }
        }

        matvec(&layer.wo, data, &s.xb2, &mut s.xb, n_threads);
        s.x.iter_mut().zip(&s.xb).for_each(|(x, d)| *x += d);

        // Feed-forward (SwiGLU)
        rms_norm(&s.x, &layer.ffn_norm, hp.rms_eps, &mut s.xb);
        matvec(&layer.w_gate, data, &s.xb, &mut s.gate, n_threads);
        matvec(&layer.w_up, data, &s.xb, &mut s.up, n_threads);
        s.gate.iter_mut().zip(&s.up).for_each(|(g, u)| *g = silu(*g) * u);
        matvec(&layer.w_down, data, &s.gate, &mut s.xb, n_threads);
        s.x.iter_mut().zip(&s.xb).for_each(|(x, d)| *x += d);
    }

    if want_logits {
        rms_norm(&s.x, &w.output_norm, hp.rms_eps, &mut s.xb);
        matvec(&w.output, data, &s.xb, &mut s.logits, n_threads);
    }
}
