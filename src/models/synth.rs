//! Tiny random-weight llama models.
//!
//! Produces valid GGUF files small enough to run in milliseconds. Used by the
//! `synth` CLI command, the benches and the test suites.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::gguf::{GgufWriter, TensorType};
use crate::engine::TokenKind;

const TOKEN_NORMAL: i32 = 1;
const TOKEN_UNKNOWN: i32 = 2;
const TOKEN_CONTROL: i32 = 3;
const TOKEN_BYTE: i32 = 6;

/// Multi-character pieces added after the single characters.
const COMMON_PIECES: &[&str] = &[
    "\u{2581}the", "\u{2581}and", "\u{2581}a", "\u{2581}to", "\u{2581}of", "\u{2581}in",
    "\u{2581}is", "ing", "er", "he", "th", "on", "an", "ll", "\u{2581}hello", "\u{2581}world",
];

/// Shape and content of a synthetic model.
#[derive(Debug, Clone)]
pub struct SynthSpec {
    pub name: String,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    pub n_head_kv: usize,
    pub n_ff: usize,
    pub n_ctx_train: usize,
    /// Encoding for the 2-D weights; norms are always `F32`.
    pub weight_type: TensorType,
    pub seed: u64,
    /// Write a separate `output.weight` instead of tying to the embeddings.
    pub untied_output: bool,
    /// Make every logit zero, so greedy decoding always picks token 0.
    pub zero_output: bool,
    pub eos_id: u32,
    /// Emit byte-fallback tokens.
    pub byte_fallback: bool,
}

impl Default for SynthSpec {
    fn default() -> Self {
        Self {
            name: "synth-tiny".to_string(),
            n_embd: 32,
            n_layer: 2,
            n_head: 4,
            n_head_kv: 2,
            n_ff: 64,
            n_ctx_train: 128,
            weight_type: TensorType::F32,
            seed: 42,
            untied_output: true,
            zero_output: false,
            eos_id: 2,
            byte_fallback: true,
        }
    }
}

/// Token table of a synthetic model: `<unk>`, `<s>`, `</s>`, optional byte
/// tokens, printable ASCII, the space marker and a few common pieces.
pub fn vocabulary(byte_fallback: bool) -> Vec<(String, TokenKind)> {
    let mut tokens = vec![
        ("<unk>".to_string(), TokenKind::Unknown),
        ("<s>".to_string(), TokenKind::Control),
        ("</s>".to_string(), TokenKind::Control),
    ];
    if byte_fallback {
        tokens.extend((0..=255u8).map(|b| (format!("<0x{b:02X}>"), TokenKind::Byte)));
    }
    tokens.extend((0x21u8..=0x7E).map(|c| ((c as char).to_string(), TokenKind::Normal)));
    tokens.push(("\u{2581}".to_string(), TokenKind::Normal));
    tokens.extend(COMMON_PIECES.iter().map(|p| (p.to_string(), TokenKind::Normal)));
    tokens
}

fn kind_id(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Unknown => TOKEN_UNKNOWN,
        TokenKind::Control => TOKEN_CONTROL,
        TokenKind::Byte => TOKEN_BYTE,
        _ => TOKEN_NORMAL,
    }
}

impl SynthSpec {
    pub fn build(&self) -> GgufWriter {
        let vocab = vocabulary(self.byte_fallback);
        let n_vocab = vocab.len();
        let kv_dim = self.n_embd / self.n_head * self.n_head_kv;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut w = GgufWriter::new();

        w.add_string("general.architecture", "llama")
            .add_string("general.name", &self.name)
            .add_u32("llama.context_length", self.n_ctx_train as u32)
            .add_u32("llama.embedding_length", self.n_embd as u32)
            .add_u32("llama.block_count", self.n_layer as u32)
            .add_u32("llama.feed_forward_length", self.n_ff as u32)
            .add_u32("llama.attention.head_count", self.n_head as u32)
            .add_u32("llama.attention.head_count_kv", self.n_head_kv as u32)
            .add_f32("llama.attention.layer_norm_rms_epsilon", 1e-5)
            .add_f32("llama.rope.freq_base", 10_000.0)
            .add_string("tokenizer.ggml.model", "llama")
            .add_string_array(
                "tokenizer.ggml.tokens",
                &vocab.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
            )
            .add_i32_array(
                "tokenizer.ggml.token_type",
                &vocab.iter().map(|(_, k)| kind_id(*k)).collect::<Vec<_>>(),
            )
            .add_u32("tokenizer.ggml.unknown_token_id", 0)
            .add_u32("tokenizer.ggml.bos_token_id", 1)
            .add_u32("tokenizer.ggml.eos_token_id", self.eos_id);

        let embd = random(&mut rng, self.n_embd * n_vocab, 1.0);
        self.add_weight(&mut w, "token_embd.weight", [self.n_embd, n_vocab], &embd);

        for i in 0..self.n_layer {
            let name = |t: &str| format!("blk.{i}.{t}.weight");
            let scale = 1.0 / (self.n_embd as f32).sqrt();
            w.add_tensor_f32(&name("attn_norm"), &[self.n_embd], &vec![1.0; self.n_embd]);
            w.add_tensor_f32(&name("ffn_norm"), &[self.n_embd], &vec![1.0; self.n_embd]);
            for (t, rows) in [("attn_q", self.n_embd), ("attn_k", kv_dim), ("attn_v", kv_dim)] {
                let data = random(&mut rng, self.n_embd * rows, scale);
                self.add_weight(&mut w, &name(t), [self.n_embd, rows], &data);
            }
            let data = random(&mut rng, self.n_embd * self.n_embd, scale);
            self.add_weight(&mut w, &name("attn_output"), [self.n_embd, self.n_embd], &data);
            for t in ["ffn_gate", "ffn_up"] {
                let data = random(&mut rng, self.n_embd * self.n_ff, scale);
                self.add_weight(&mut w, &name(t), [self.n_embd, self.n_ff], &data);
            }
            let data = random(&mut rng, self.n_ff * self.n_embd, 1.0 / (self.n_ff as f32).sqrt());
            self.add_weight(&mut w, &name("ffn_down"), [self.n_ff, self.n_embd], &data);
        }

        w.add_tensor_f32("output_norm.weight", &[self.n_embd], &vec![1.0; self.n_embd]);
        if self.untied_output || self.zero_output {
            let data = if self.zero_output {
                vec![0.0; self.n_embd * n_vocab]
            } else {
                random(&mut rng, self.n_embd * n_vocab, 1.0)
            };
            self.add_weight(&mut w, "output.weight", [self.n_embd, n_vocab], &data);
        }
        w
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        self.build().write_to(path)
    }

    fn add_weight(&self, w: &mut GgufWriter, name: &str, dims: [usize; 2], data: &[f32]) {
        match self.weight_type {
            TensorType::F32 => w.add_tensor_f32(name, &dims, data),
            TensorType::F16 => w.add_tensor_f16(name, &dims, data),
            TensorType::Q8_0 => w.add_tensor_q8_0(name, &dims, data),
        };
    }
}

fn random(rng: &mut StdRng, n: usize, scale: f32) -> Vec<f32> {
    (0..n).map(|_| rng.gen_range(-1.0f32..1.0) * scale).collect()
}
