//! Numeric kernels used by the forward pass.

use super::quantize::Weight;

/// Below this many multiply-adds a matvec runs on the calling thread.
const PARALLEL_MIN_WORK: usize = 1 << 16;

/// `out = W · x`, splitting output rows across up to `n_threads` threads.
pub fn matvec(w: &Weight, data: &[u8], x: &[f32], out: &mut [f32], n_threads: usize) {
    debug_assert_eq!(x.len(), w.cols());
    debug_assert_eq!(out.len(), w.rows());

    let work = w.rows() * w.cols();
    if n_threads <= 1 || work < PARALLEL_MIN_WORK || w.rows() < n_threads {
        matvec_rows(w, data, x, out, 0);
        return;
    }

    let chunk = w.rows().div_ceil(n_threads);
    std::thread::scope(|s| {
        for (i, part) in out.chunks_mut(chunk).enumerate() {
            s.spawn(move || matvec_rows(w, data, x, part, i * chunk));
        }
    });
}

fn matvec_rows(w: &Weight, data: &[u8], x: &[f32], out: &mut [f32], first_row: usize) {
    let mut row = vec![0.0f32; w.cols()];
    for (i, o) in out.iter_mut().enumerate() {
        w.dequantize_row(data, first_row + i, &mut row);
        *o = dot(&row, x);
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Root-mean-square normalization scaled by `weight`.
pub fn rms_norm(x: &[f32], weight: &[f32], eps: f32, out: &mut [f32]) {
    let mean_sq = x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32;
    let scale = 1.0 / (mean_sq + eps).sqrt();
    for ((o, v), w) in out.iter_mut().zip(x).zip(weight) {
        *o = v * scale * w;
    }
}

/// Rotary position embedding over adjacent pairs, applied per head.
pub fn rope(x: &mut [f32], pos: usize, head_dim: usize, freq_base: f32) {
    for head in x.chunks_mut(head_dim) {
        for i in (0..head_dim).step_by(2) {
            let theta = pos as f32 * freq_base.powf(-(i as f32) / head_dim as f32);
            let (sin, cos) = theta.sin_cos();
            let (a, b) = (head[i], head[i + 1]);
            head[i] = a * cos - b * sin;
            head[i + 1] = a * sin + b * cos;
        }
    }
}

/// Numerically stable softmax. Entries at `-inf` end up as zero.
pub fn softmax(x: &mut [f32]) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        let n = x.len() as f32;
        x.iter_mut().for_each(|v| *v = 1.0 / n);
        return;
    }
    let mut sum = 0.0;
    for v in x.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in x.iter_mut() {
        *v /= sum;
    }
}

pub fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}
