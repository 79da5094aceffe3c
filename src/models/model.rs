//! Loaded model: hyperparameters, weight views, vocabulary and summary info.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::gguf::{self, GgufFile, GgufValue, TensorType};
use super::loader::{LoadError, MappedModel, ModelLoader};
use crate::engine::quantize::Weight;
use crate::engine::tokenizer::{TokenKind, Tokenizer, Vocabulary};

const SUPPORTED_ARCH: &str = "llama";
const DEFAULT_RMS_EPS: f32 = 1e-5;
const DEFAULT_ROPE_BASE: f32 = 10_000.0;

/// Architecture hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hyperparams {
    pub n_vocab: usize,
    /// Longest context the model was trained on; upper bound for windows.
    pub n_ctx_train: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    pub n_head_kv: usize,
    pub n_ff: usize,
    pub rms_eps: f32,
    pub rope_freq_base: f32,
}

impl Hyperparams {
    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    /// Width of one key (or value) vector across all KV heads.
    pub fn kv_dim(&self) -> usize {
        self.head_dim() * self.n_head_kv
    }
}

pub struct LayerWeights {
    pub attn_norm: Vec<f32>,
    pub wq: Weight,
    pub wk: Weight,
    pub wv: Weight,
    pub wo: Weight,
    pub ffn_norm: Vec<f32>,
    pub w_gate: Weight,
    pub w_up: Weight,
    pub w_down: Weight,
}

pub struct ModelWeights {
    pub token_embd: Weight,
    pub output_norm: Vec<f32>,
    /// Falls back to `token_embd` when the file has no separate head.
    pub output: Weight,
    pub layers: Vec<LayerWeights>,
}

/// Serializable model summary.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub name: String,
    pub architecture: String,
    pub size_bytes: u64,
    /// Encoding holding the most weight bytes.
    pub quantization: TensorType,
    pub vocab_size: usize,
    pub hparams: Hyperparams,
    /// SHA-256 of the header and metadata region, hex encoded.
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

/// An immutable, memory-mapped model shared by every context created from it.
pub struct Model {
    mapped: MappedModel,
    hparams: Hyperparams,
    weights: ModelWeights,
    tokenizer: Tokenizer,
    info: ModelInfo,
}

impl Model {
    pub fn load(loader: &ModelLoader, path: &Path) -> Result<Self, LoadError> {
        let mapped = loader.open(path)?;
        Self::from_mapped(mapped)
    }

    pub fn from_mapped(mapped: MappedModel) -> Result<Self, LoadError> {
        let file = gguf::parse(mapped.as_bytes())?;

        let arch = required_str(&file, "general.architecture")?;
        if arch != SUPPORTED_ARCH {
            return Err(LoadError::Format(format!("unsupported architecture '{arch}'")));
        }

        let vocab = read_vocabulary(&file)?;
        let n_vocab = vocab.tokens.len();
        let tokenizer = Tokenizer::new(vocab).map_err(|e| LoadError::Format(e.to_string()))?;
        let hparams = read_hparams(&file, arch, n_vocab)?;
        let weights = read_weights(&file, mapped.as_bytes(), &hparams)?;

        let info = ModelInfo {
            path: mapped.path().to_path_buf(),
            name: file
                .get("general.name")
                .and_then(GgufValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| file_stem(mapped.path())),
            architecture: arch.to_string(),
            size_bytes: mapped.len() as u64,
            quantization: dominant_type(&file),
            vocab_size: n_vocab,
            hparams,
            fingerprint: hex::encode(Sha256::digest(&mapped.as_bytes()[..file.header_len])),
            loaded_at: Utc::now(),
        };

        tracing::info!(
            path = %info.path.display(),
            name = %info.name,
            size_bytes = info.size_bytes,
            quantization = %info.quantization,
            n_layer = hparams.n_layer,
            n_embd = hparams.n_embd,
            n_vocab,
            "Model loaded"
        );

        Ok(Self { mapped, hparams, weights, tokenizer, info })
    }

    pub fn hparams(&self) -> &Hyperparams {
        &self.hparams
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Raw mapped bytes that `Weight` offsets index into.
    pub fn data(&self) -> &[u8] {
        self.mapped.as_bytes()
    }

    pub fn path(&self) -> &Path {
        self.mapped.path()
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        tracing::info!(path = %self.info.path.display(), "Model released");
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("path", &self.info.path)
            .field("hparams", &self.hparams)
            .finish()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn required_str<'a>(file: &'a GgufFile, key: &str) -> Result<&'a str, LoadError> {
    file.get(key)
        .and_then(GgufValue::as_str)
        .ok_or_else(|| LoadError::Format(format!("missing string key '{key}'")))
}

fn required_usize(file: &GgufFile, key: &str) -> Result<usize, LoadError> {
    optional_usize(file, key)?
        .filter(|&v| v > 0)
        .ok_or_else(|| LoadError::Format(format!("missing or zero '{key}'")))
}

fn optional_usize(file: &GgufFile, key: &str) -> Result<Option<usize>, LoadError> {
    match file.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| LoadError::Format(format!("'{key}' is not an unsigned integer"))),
    }
}

fn optional_f32(file: &GgufFile, key: &str, default: f32) -> Result<f32, LoadError> {
    match file.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_f32()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| LoadError::Format(format!("'{key}' is not a positive float"))),
    }
}

fn read_vocabulary(file: &GgufFile) -> Result<Vocabulary, LoadError> {
    let tokens = file
        .get("tokenizer.ggml.tokens")
        .and_then(GgufValue::as_array)
        .ok_or_else(|| LoadError::Format("missing tokenizer.ggml.tokens".into()))?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| LoadError::Format("non-string entry in token list".into()))?;

    let kinds = match file.get("tokenizer.ggml.token_type").and_then(GgufValue::as_array) {
        None => Vec::new(),
        Some(items) => items
            .iter()
            .map(|v| match *v {
                GgufValue::I32(t) => Some(TokenKind::from_gguf(t as i64)),
                ref other => other.as_u64().map(|t| TokenKind::from_gguf(t as i64)),
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| LoadError::Format("non-integer entry in token types".into()))?,
    };

    let id = |key: &str| -> Result<Option<u32>, LoadError> {
        optional_usize(file, key)?
            .map(|v| u32::try_from(v).map_err(|_| LoadError::Format(format!("'{key}' too large"))))
            .transpose()
    };

    Ok(Vocabulary {
        tokens,
        kinds,
        bos: id("tokenizer.ggml.bos_token_id")?,
        eos: id("tokenizer.ggml.eos_token_id")?,
        unk: id("tokenizer.ggml.unknown_token_id")?,
        space_marker: file.get("tokenizer.ggml.model").and_then(GgufValue::as_str) == Some("llama"),
    })
}

fn read_hparams(file: &GgufFile, arch: &str, n_vocab: usize) -> Result<Hyperparams, LoadError> {
    let key = |k: &str| format!("{arch}.{k}");
    let n_head = required_usize(file, &key("attention.head_count"))?;
    let hp = Hyperparams {
        n_vocab,
        n_ctx_train: required_usize(file, &key("context_length"))?,
        n_embd: required_usize(file, &key("embedding_length"))?,
        n_layer: required_usize(file, &key("block_count"))?,
        n_head,
        n_head_kv: optional_usize(file, &key("attention.head_count_kv"))?.unwrap_or(n_head),
        n_ff: required_usize(file, &key("feed_forward_length"))?,
        rms_eps: optional_f32(file, &key("attention.layer_norm_rms_epsilon"), DEFAULT_RMS_EPS)?,
        rope_freq_base: optional_f32(file, &key("rope.freq_base"), DEFAULT_ROPE_BASE)?,
    };

    if hp.n_head_kv == 0 || hp.n_head % hp.n_head_kv != 0 {
        return Err(LoadError::Format(format!(
            "{} heads cannot be grouped over {} KV heads",
            hp.n_head, hp.n_head_kv
        )));
    }
    if hp.n_embd % hp.n_head != 0 || hp.head_dim() % 2 != 0 {
        return Err(LoadError::Format(format!(
            "embedding {} does not split into even-width heads of {}",
            hp.n_embd, hp.n_head
        )));
    }
    Ok(hp)
}

fn read_weights(file: &GgufFile, data: &[u8], hp: &Hyperparams) -> Result<ModelWeights, LoadError> {
    let token_embd = weight(file, "token_embd.weight", hp.n_embd, hp.n_vocab)?;
    let output = if file.tensor("output.weight").is_some() {
        weight(file, "output.weight", hp.n_embd, hp.n_vocab)?
    } else {
        token_embd
    };

    let kv_dim = hp.kv_dim();
    let layers = (0..hp.n_layer)
        .map(|i| {
            let name = |t: &str| format!("blk.{i}.{t}.weight");
            Ok(LayerWeights {
                attn_norm: vector(file, data, &name("attn_norm"), hp.n_embd)?,
                wq: weight(file, &name("attn_q"), hp.n_embd, hp.n_embd)?,
                wk: weight(file, &name("attn_k"), hp.n_embd, kv_dim)?,
                wv: weight(file, &name("attn_v"), hp.n_embd, kv_dim)?,
                wo: weight(file, &name("attn_output"), hp.n_embd, hp.n_embd)?,
                ffn_norm: vector(file, data, &name("ffn_norm"), hp.n_embd)?,
                w_gate: weight(file, &name("ffn_gate"), hp.n_embd, hp.n_ff)?,
                w_up: weight(file, &name("ffn_up"), hp.n_embd, hp.n_ff)?,
                w_down: weight(file, &name("ffn_down"), hp.n_ff, hp.n_embd)?,
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(ModelWeights {
        token_embd,
        output_norm: vector(file, data, "output_norm.weight", hp.n_embd)?,
        output,
        layers,
    })
}

/// Resolve a 2-D tensor with row length `cols` and `rows` rows.
fn weight(file: &GgufFile, name: &str, cols: usize, rows: usize) -> Result<Weight, LoadError> {
    let info = file
        .tensor(name)
        .ok_or_else(|| LoadError::Format(format!("missing tensor '{name}'")))?;

    let shape_ok = match info.dims.as_slice() {
        [c] => *c as usize == cols && rows == 1,
        [c, r] => *c as usize == cols && *r as usize == rows,
        _ => false,
    };
    if !shape_ok {
        return Err(LoadError::Format(format!(
            "tensor '{name}' has shape {:?}, expected [{cols}, {rows}]",
            info.dims
        )));
    }

    let offset = usize::try_from(info.offset)
        .ok()
        .and_then(|o| o.checked_add(file.data_offset))
        .ok_or_else(|| LoadError::Format(format!("tensor '{name}' offset out of range")))?;
    Weight::new(offset, info.ty, cols, rows).ok_or_else(|| {
        LoadError::Format(format!("tensor '{name}' rows do not fill whole {} blocks", info.ty))
    })
}

/// Small 1-D tensors (norm scales) are dequantized once at load.
fn vector(file: &GgufFile, data: &[u8], name: &str, len: usize) -> Result<Vec<f32>, LoadError> {
    Ok(weight(file, name, len, 1)?.to_vec(data))
}

fn dominant_type(file: &GgufFile) -> TensorType {
    let mut bytes: HashMap<TensorType, u64> = HashMap::new();
    for t in &file.tensors {
        let n = usize::try_from(t.n_elements()).unwrap_or(usize::MAX);
        let size = t.ty.bytes_for(n).unwrap_or(0) as u64;
        *bytes.entry(t.ty).or_default() += size;
    }
    bytes
        .into_iter()
        .max_by_key(|&(ty, n)| (n, ty.id()))
        .map(|(ty, _)| ty)
        .unwrap_or(TensorType::F32)
}
