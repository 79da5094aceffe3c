//! Weight views over the mapped model and row dequantization.
//!
//! Weights are never copied out of the mapping wholesale; each matmul
//! dequantizes one row at a time into a scratch buffer.

use half::f16;

use crate::models::gguf::{TensorType, Q8_0_BLOCK, Q8_0_BLOCK_BYTES};

/// A 2-D weight matrix stored in the mapped file.
///
/// `cols` is the row length (input dimension), `rows` the output dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weight {
    offset: usize,
    ty: TensorType,
    cols: usize,
    rows: usize,
    row_bytes: usize,
}

impl Weight {
    /// Returns `None` if `cols` does not fill whole quantization blocks.
    pub fn new(offset: usize, ty: TensorType, cols: usize, rows: usize) -> Option<Self> {
        let row_bytes = ty.bytes_for(cols)?;
        Some(Self { offset, ty, cols, rows, row_bytes })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn ty(&self) -> TensorType {
        self.ty
    }

    pub fn byte_len(&self) -> usize {
        self.row_bytes * self.rows
    }

    /// Raw bytes of one row.
    pub fn row<'a>(&self, data: &'a [u8], row: usize) -> &'a [u8] {
        let start = self.offset + row * self.row_bytes;
        &data[start..start + self.row_bytes]
    }

    /// Dequantize one row into `out` (length `cols`).
    pub fn dequantize_row(&self, data: &[u8], row: usize, out: &mut [f32]) {
        dequantize(self.ty, self.row(data, row), out);
    }

    /// Dequantize the whole tensor. Only used for small vectors such as norms.
    pub fn to_vec(&self, data: &[u8]) -> Vec<f32> {
        let mut out = vec![0.0; self.cols * self.rows];
        for (r, chunk) in out.chunks_mut(self.cols).enumerate() {
            self.dequantize_row(data, r, chunk);
        }
        out
    }
}

/// Decode `out.len()` elements of type `ty` from `bytes`.
pub fn dequantize(ty: TensorType, bytes: &[u8], out: &mut [f32]) {
    match ty {
        TensorType::F32 => {
            for (o, b) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                *o = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            }
        }
        TensorType::F16 => {
            for (o, b) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *o = f16::from_le_bytes([b[0], b[1]]).to_f32();
            }
        }
        TensorType::Q8_0 => {
            for (o, block) in out
                .chunks_mut(Q8_0_BLOCK)
                .zip(bytes.chunks_exact(Q8_0_BLOCK_BYTES))
            {
                let d = f16::from_le_bytes([block[0], block[1]]).to_f32();
                for (v, &q) in o.iter_mut().zip(&block[2..]) {
                    *v = d * (q as i8) as f32;
                }
            }
        }
    }
}
