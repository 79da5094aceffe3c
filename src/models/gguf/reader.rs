//! GGUF header parser over an in-memory (usually memory-mapped) buffer.
//!
//! Every length read from the file is checked against the remaining bytes
//! before allocating, so a corrupt header cannot trigger huge allocations.

use std::collections::BTreeMap;

use super::{
    GgufError, GgufFile, GgufValue, TensorInfo, TensorType, DEFAULT_ALIGNMENT, GGUF_MAGIC,
    MAX_VERSION, MIN_VERSION,
};

/// Deepest array nesting accepted in metadata.
const MAX_ARRAY_DEPTH: usize = 4;

/// Highest tensor rank accepted.
const MAX_DIMS: u32 = 4;

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], GgufError> {
        if n > self.remaining() {
            return Err(GgufError::Truncated(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], GgufError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, GgufError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, GgufError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, GgufError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, GgufError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Length prefix checked against what is left in the buffer.
    fn len_prefix(&mut self, min_item_bytes: usize) -> Result<usize, GgufError> {
        let at = self.pos;
        let n = self.u64()?;
        let n = usize::try_from(n).map_err(|_| GgufError::Truncated(at))?;
        if n.saturating_mul(min_item_bytes.max(1)) > self.remaining() {
            return Err(GgufError::Truncated(at));
        }
        Ok(n)
    }

    fn string(&mut self) -> Result<String, GgufError> {
        let n = self.len_prefix(1)?;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| GgufError::InvalidMetadata("string is not valid UTF-8".into()))
    }

    fn value(&mut self, type_id: u32, depth: usize) -> Result<GgufValue, GgufError> {
        Ok(match type_id {
            0 => GgufValue::U8(self.u8()?),
            1 => GgufValue::I8(self.u8()? as i8),
            2 => GgufValue::U16(self.u16()?),
            3 => GgufValue::I16(self.u16()? as i16),
            4 => GgufValue::U32(self.u32()?),
            5 => GgufValue::I32(self.u32()? as i32),
            6 => GgufValue::F32(f32::from_le_bytes(self.array()?)),
            7 => match self.u8()? {
                0 => GgufValue::Bool(false),
                1 => GgufValue::Bool(true),
                b => {
                    return Err(GgufError::InvalidMetadata(format!("bool byte {b}")));
                }
            },
            8 => GgufValue::String(self.string()?),
            9 => {
                if depth >= MAX_ARRAY_DEPTH {
                    return Err(GgufError::InvalidMetadata("arrays nested too deeply".into()));
                }
                let elem_type = self.u32()?;
                let n = self.len_prefix(min_value_bytes(elem_type))?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.value(elem_type, depth + 1)?);
                }
                GgufValue::Array(items)
            }
            10 => GgufValue::U64(self.u64()?),
            11 => GgufValue::I64(self.u64()? as i64),
            12 => GgufValue::F64(f64::from_le_bytes(self.array()?)),
            other => {
                return Err(GgufError::InvalidMetadata(format!("unknown value type {other}")));
            }
        })
    }
}

/// Smallest encoding of a value of the given type, used to bound array counts.
fn min_value_bytes(type_id: u32) -> usize {
    match type_id {
        0 | 1 | 7 => 1,
        2 | 3 => 2,
        4 | 5 | 6 => 4,
        8 | 10 | 11 | 12 => 8,
        9 => 12,
        _ => 1,
    }
}

fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Parse a GGUF header and validate every tensor's byte range.
pub fn parse(buf: &[u8]) -> Result<GgufFile, GgufError> {
    let mut cur = Cursor::new(buf);

    let magic: [u8; 4] = cur.array()?;
    if &magic != GGUF_MAGIC {
        return Err(GgufError::BadMagic(magic));
    }
    let version = cur.u32()?;
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(GgufError::UnsupportedVersion(version));
    }

    // Minimal tensor descriptor: empty name (8) + rank (4) + type (4) + offset (8).
    let n_tensors = cur.len_prefix(24)?;
    // Minimal key/value: empty key (8) + type (4) + one byte.
    let n_kv = cur.len_prefix(13)?;

    let mut metadata = BTreeMap::new();
    for _ in 0..n_kv {
        let key = cur.string()?;
        let type_id = cur.u32()?;
        let value = cur.value(type_id, 0)?;
        if metadata.insert(key.clone(), value).is_some() {
            return Err(GgufError::InvalidMetadata(format!("duplicate key '{key}'")));
        }
    }

    let alignment = match metadata.get("general.alignment") {
        Some(v) => {
            let a = v.as_u64().ok_or_else(|| {
                GgufError::InvalidMetadata("general.alignment is not an integer".into())
            })? as usize;
            if a == 0 || !a.is_power_of_two() {
                return Err(GgufError::InvalidMetadata(format!("alignment {a}")));
            }
            a
        }
        None => DEFAULT_ALIGNMENT,
    };

    let mut tensors = Vec::with_capacity(n_tensors);
    for _ in 0..n_tensors {
        tensors.push(read_tensor_info(&mut cur)?);
    }

    let header_len = cur.pos;
    let data_offset = align_up(header_len, alignment);
    if data_offset > buf.len() && !tensors.is_empty() {
        return Err(GgufError::Truncated(header_len));
    }

    for t in &tensors {
        check_tensor_range(t, alignment, data_offset, buf.len())?;
    }

    Ok(GgufFile { version, metadata, tensors, data_offset, header_len })
}

fn read_tensor_info(cur: &mut Cursor<'_>) -> Result<TensorInfo, GgufError> {
    let name = cur.string()?;
    let n_dims = cur.u32()?;
    if n_dims == 0 || n_dims > MAX_DIMS {
        return Err(GgufError::InvalidTensor { name, reason: format!("rank {n_dims}") });
    }
    let mut dims = Vec::with_capacity(n_dims as usize);
    for _ in 0..n_dims {
        dims.push(cur.u64()?);
    }
    let type_id = cur.u32()?;
    let ty = TensorType::from_id(type_id).ok_or_else(|| GgufError::InvalidTensor {
        name: name.clone(),
        reason: format!("unsupported tensor type {type_id}"),
    })?;
    let offset = cur.u64()?;
    Ok(TensorInfo { name, dims, ty, offset })
}

fn check_tensor_range(
    t: &TensorInfo,
    alignment: usize,
    data_offset: usize,
    file_len: usize,
) -> Result<(), GgufError> {
    let invalid = |reason: String| GgufError::InvalidTensor { name: t.name.clone(), reason };

    if t.dims.iter().any(|&d| d == 0) {
        return Err(invalid("zero-sized dimension".into()));
    }
    let n = t
        .dims
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(d))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid("element count overflows".into()))?;
    // Row length must fill whole quantization blocks.
    let row = usize::try_from(t.dims[0]).map_err(|_| invalid("row too long".into()))?;
    if t.ty.bytes_for(row).is_none() {
        return Err(invalid(format!("row length {row} not a multiple of the {} block", t.ty)));
    }
    let bytes = t.ty.bytes_for(n).ok_or_else(|| invalid("byte size overflows".into()))?;
    let offset = usize::try_from(t.offset).map_err(|_| invalid("offset overflows".into()))?;
    if offset % alignment != 0 {
        return Err(invalid(format!("offset {offset} not aligned to {alignment}")));
    }
    let end = data_offset
        .checked_add(offset)
        .and_then(|s| s.checked_add(bytes))
        .ok_or_else(|| invalid("range overflows".into()))?;
    if end > file_len {
        return Err(invalid(format!("data ends at {end}, file is {file_len} bytes")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gguf::GgufWriter;

    #[test]
    fn rejects_bad_magic() {
        let err = parse(b"GGML\x03\0\0\0").unwrap_err();
        assert!(matches!(err, GgufError::BadMagic(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = b"GGUF".to_vec();
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(parse(&bytes).unwrap_err(), GgufError::UnsupportedVersion(9));
    }

    #[test]
    fn truncated_header_is_reported() {
        let mut w = GgufWriter::new();
        w.add_string("general.name", "tiny");
        let bytes = w.to_bytes();
        let err = parse(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, GgufError::Truncated(_)));
    }

    #[test]
    fn huge_array_count_does_not_allocate() {
        let mut bytes = b"GGUF".to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.push(b'k');
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(parse(&bytes).unwrap_err(), GgufError::Truncated(_)));
    }

    #[test]
    fn parses_metadata_and_tensors() {
        let mut w = GgufWriter::new();
        w.add_u32("llama.block_count", 2);
        w.add_f32("llama.attention.layer_norm_rms_epsilon", 1e-5);
        w.add_string_array("tokenizer.ggml.tokens", &["a", "b"]);
        w.add_tensor_f32("output_norm.weight", &[4], &[1.0, 2.0, 3.0, 4.0]);
        w.add_tensor_f16("token_embd.weight", &[4, 2], &[0.5; 8]);
        let bytes = w.to_bytes();

        let file = parse(&bytes).unwrap();
        assert_eq!(file.version, 3);
        assert_eq!(file.get("llama.block_count").and_then(|v| v.as_u64()), Some(2));
        let tokens = file.get("tokenizer.ggml.tokens").and_then(|v| v.as_array()).unwrap();
        assert_eq!(tokens.len(), 2);
        let embd = file.tensor("token_embd.weight").unwrap();
        assert_eq!(embd.dims, vec![4, 2]);
        assert_eq!(embd.ty, TensorType::F16);
        assert_eq!(file.data_offset % DEFAULT_ALIGNMENT, 0);
    }

    #[test]
    fn tensor_past_end_of_file_is_rejected() {
        let mut w = GgufWriter::new();
        w.add_tensor_f32("t", &[8], &[0.0; 8]);
        let bytes = w.to_bytes();
        let err = parse(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, GgufError::InvalidTensor { .. }));
    }
}
