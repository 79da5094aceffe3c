//! GGUF v3 writer.
//!
//! Builds small model files in memory: used by the `synth` CLI command, the
//! benches and the test fixtures.

use std::path::Path;

use half::f16;

use super::{GgufValue, TensorType, DEFAULT_ALIGNMENT, GGUF_MAGIC, Q8_0_BLOCK};

struct PendingTensor {
    name: String,
    dims: Vec<u64>,
    ty: TensorType,
    data: Vec<u8>,
}

/// Accumulates metadata and tensors, then serializes a complete file.
#[derive(Default)]
pub struct GgufWriter {
    metadata: Vec<(String, GgufValue)>,
    tensors: Vec<PendingTensor>,
}

impl GgufWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, key: &str, value: GgufValue) -> &mut Self {
        self.metadata.retain(|(k, _)| k != key);
        self.metadata.push((key.to_string(), value));
        self
    }

    pub fn add_u32(&mut self, key: &str, v: u32) -> &mut Self {
        self.add_value(key, GgufValue::U32(v))
    }

    pub fn add_f32(&mut self, key: &str, v: f32) -> &mut Self {
        self.add_value(key, GgufValue::F32(v))
    }

    pub fn add_string(&mut self, key: &str, v: &str) -> &mut Self {
        self.add_value(key, GgufValue::String(v.to_string()))
    }

    pub fn add_string_array<S: AsRef<str>>(&mut self, key: &str, items: &[S]) -> &mut Self {
        let items = items
            .iter()
            .map(|s| GgufValue::String(s.as_ref().to_string()))
            .collect();
        self.add_value(key, GgufValue::Array(items))
    }

    pub fn add_i32_array(&mut self, key: &str, items: &[i32]) -> &mut Self {
        let items = items.iter().map(|&v| GgufValue::I32(v)).collect();
        self.add_value(key, GgufValue::Array(items))
    }

    /// `dims` are fastest-varying first, matching the on-disk order.
    pub fn add_tensor_f32(&mut self, name: &str, dims: &[usize], data: &[f32]) -> &mut Self {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push_tensor(name, dims, TensorType::F32, bytes)
    }

    pub fn add_tensor_f16(&mut self, name: &str, dims: &[usize], data: &[f32]) -> &mut Self {
        let bytes = data
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect();
        self.push_tensor(name, dims, TensorType::F16, bytes)
    }

    /// Quantize to `Q8_0`. The row length (`dims[0]`) must be a multiple of 32.
    pub fn add_tensor_q8_0(&mut self, name: &str, dims: &[usize], data: &[f32]) -> &mut Self {
        let mut bytes = Vec::with_capacity(data.len() / Q8_0_BLOCK * (Q8_0_BLOCK + 2));
        for block in data.chunks(Q8_0_BLOCK) {
            let amax = block.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let d = amax / 127.0;
            let inv = if d > 0.0 { 1.0 / d } else { 0.0 };
            bytes.extend_from_slice(&f16::from_f32(d).to_le_bytes());
            for &v in block {
                bytes.push((v * inv).round().clamp(-127.0, 127.0) as i8 as u8);
            }
        }
        self.push_tensor(name, dims, TensorType::Q8_0, bytes)
    }

    fn push_tensor(&mut self, name: &str, dims: &[usize], ty: TensorType, data: Vec<u8>) -> &mut Self {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            dims: dims.iter().map(|&d| d as u64).collect(),
            ty,
            data,
        });
        self
    }

    /// Serialize the complete file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(GGUF_MAGIC);
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&(self.tensors.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.metadata.len() as u64).to_le_bytes());

        for (key, value) in &self.metadata {
            write_string(&mut out, key);
            out.extend_from_slice(&value.type_id().to_le_bytes());
            write_value(&mut out, value);
        }

        let mut offsets = Vec::with_capacity(self.tensors.len());
        let mut next = 0usize;
        for t in &self.tensors {
            offsets.push(next);
            next = pad_to(next + t.data.len(), DEFAULT_ALIGNMENT);
        }

        for (t, offset) in self.tensors.iter().zip(&offsets) {
            write_string(&mut out, &t.name);
            out.extend_from_slice(&(t.dims.len() as u32).to_le_bytes());
            for d in &t.dims {
                out.extend_from_slice(&d.to_le_bytes());
            }
            out.extend_from_slice(&t.ty.id().to_le_bytes());
            out.extend_from_slice(&(*offset as u64).to_le_bytes());
        }

        if self.tensors.is_empty() {
            return out;
        }

        let data_start = pad_to(out.len(), DEFAULT_ALIGNMENT);
        out.resize(data_start, 0);
        for (t, offset) in self.tensors.iter().zip(&offsets) {
            out.resize(data_start + offset, 0);
            out.extend_from_slice(&t.data);
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }
}

fn pad_to(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn write_value(out: &mut Vec<u8>, value: &GgufValue) {
    match value {
        GgufValue::U8(v) => out.push(*v),
        GgufValue::I8(v) => out.push(*v as u8),
        GgufValue::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::Bool(v) => out.push(u8::from(*v)),
        GgufValue::String(s) => write_string(out, s),
        GgufValue::Array(items) => {
            // Empty arrays are written as u8 arrays.
            let elem_type = items.first().map(|v| v.type_id()).unwrap_or(0);
            out.extend_from_slice(&elem_type.to_le_bytes());
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                write_value(out, item);
            }
        }
        GgufValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GgufValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
}
