//! Shared fixtures: tiny synthetic models written to temp directories.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use llm_bridge::engine::{SamplingParams, Tokenizer, Vocabulary};
use llm_bridge::models::synth::{self, SynthSpec};
use llm_bridge::models::{Model, ModelLoader};
use llm_bridge::{BridgeConfig, ContextParams, GenerationRequest, SessionManager};

/// Trained context length of the default fixture.
pub const TRAIN_CTX: usize = 128;

/// A model file that lives as long as the fixture.
pub struct ModelFixture {
    _dir: TempDir,
    pub path: PathBuf,
}

pub fn write_model(spec: &SynthSpec) -> ModelFixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join(format!("{}.gguf", spec.name));
    spec.write_to(&path).expect("write synthetic model");
    ModelFixture { _dir: dir, path }
}

pub fn tiny_model() -> ModelFixture {
    write_model(&SynthSpec::default())
}

/// No byte tokens, so every sampled token decodes to printable text.
pub fn ascii_model() -> ModelFixture {
    write_model(&SynthSpec {
        name: "synth-ascii".to_string(),
        byte_fallback: false,
        ..SynthSpec::default()
    })
}

/// Every logit is zero and EOS is token 0, so greedy decoding ends at once.
pub fn eos_model() -> ModelFixture {
    write_model(&SynthSpec {
        name: "synth-eos".to_string(),
        zero_output: true,
        eos_id: 0,
        ..SynthSpec::default()
    })
}

pub fn load(fixture: &ModelFixture) -> Arc<Model> {
    Arc::new(Model::load(&ModelLoader::new(None), &fixture.path).expect("load model"))
}

/// Deterministic sampling that never stops on EOS.
pub fn greedy() -> SamplingParams {
    SamplingParams { ignore_eos: true, ..SamplingParams::greedy() }
}

pub fn greedy_request(prompt: &str, max_new_tokens: usize) -> GenerationRequest {
    GenerationRequest::new(prompt, max_new_tokens).with_sampling(greedy())
}

pub fn config(window_size: usize) -> BridgeConfig {
    BridgeConfig {
        context: ContextParams { window_size, n_threads: 1, ..ContextParams::default() },
        generation_timeout_ms: 0,
        lock_timeout_ms: 200,
        default_sampling: greedy(),
        ..BridgeConfig::default()
    }
}

/// A manager with `fixture` loaded and a 64-token window.
pub fn loaded_manager(fixture: &ModelFixture) -> SessionManager {
    let manager = SessionManager::new(config(64));
    manager.load_model(&fixture.path).expect("load model");
    manager
}

/// Tokenizer over the synthetic vocabulary.
pub fn tokenizer(byte_fallback: bool, unk: Option<u32>) -> Tokenizer {
    let (tokens, kinds) = synth::vocabulary(byte_fallback).into_iter().unzip();
    Tokenizer::new(Vocabulary {
        tokens,
        kinds,
        bos: Some(1),
        eos: Some(2),
        unk,
        space_marker: true,
    })
    .expect("valid vocabulary")
}

/// Id of the byte-fallback token for `b` in the synthetic vocabulary.
pub fn byte_token(b: u8) -> u32 {
    3 + b as u32
}
