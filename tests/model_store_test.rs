//! Model store tests: GGUF validation, metadata, handles and unloading.

mod common;

use std::sync::Arc;

use llm_bridge::models::gguf::{self, GgufWriter, TensorType};
use llm_bridge::models::synth::SynthSpec;
use llm_bridge::models::{LoadError, ModelLoader, ModelStore};

use common::{tiny_model, write_model, TRAIN_CTX};

fn store() -> ModelStore {
    ModelStore::new(ModelLoader::new(None))
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_reports_metadata() {
    let fixture = tiny_model();
    let store = store();
    let handle = store.load(&fixture.path).unwrap();
    let info = store.info(handle).unwrap();

    assert_eq!(info.name, "synth-tiny");
    assert_eq!(info.architecture, "llama");
    assert_eq!(info.quantization, TensorType::F32);
    assert_eq!(info.path, fixture.path);
    assert_eq!(info.hparams.n_ctx_train, TRAIN_CTX);
    assert_eq!(info.hparams.n_layer, 2);
    assert_eq!(info.vocab_size, info.hparams.n_vocab);
    assert_eq!(info.size_bytes, std::fs::metadata(&fixture.path).unwrap().len());
    assert_eq!(info.fingerprint.len(), 64);
}

#[test]
fn test_load_quantized_weights() {
    for ty in [TensorType::F16, TensorType::Q8_0] {
        let fixture = write_model(&SynthSpec { weight_type: ty, ..SynthSpec::default() });
        let store = store();
        let handle = store.load(&fixture.path).unwrap();
        assert_eq!(store.info(handle).unwrap().quantization, ty);
    }
}

#[test]
fn test_load_tied_output_weights() {
    let fixture = write_model(&SynthSpec { untied_output: false, ..SynthSpec::default() });
    let store = store();
    let handle = store.load(&fixture.path).unwrap();
    let model = store.get(handle).unwrap();
    assert_eq!(model.weights().output, model.weights().token_embd);
}

#[test]
fn test_fingerprint_tracks_metadata() {
    let a = write_model(&SynthSpec::default());
    let b = write_model(&SynthSpec { name: "other".to_string(), ..SynthSpec::default() });
    let store = store();
    let ha = store.load(&a.path).unwrap();
    let ha2 = store.load(&a.path).unwrap();
    let hb = store.load(&b.path).unwrap();

    let fa = store.info(ha).unwrap().fingerprint;
    assert_eq!(fa, store.info(ha2).unwrap().fingerprint);
    assert_ne!(fa, store.info(hb).unwrap().fingerprint);
}

#[test]
fn test_each_load_gets_a_new_handle() {
    let fixture = tiny_model();
    let store = store();
    let h1 = store.load(&fixture.path).unwrap();
    let h2 = store.load(&fixture.path).unwrap();
    assert_ne!(h1, h2);
    assert_eq!(store.count(), 2);
    assert_eq!(h1.to_string(), format!("model#{}", h1.id()));
}

// ============================================================================
// Load failures
// ============================================================================

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = store().load(&dir.path().join("absent.gguf")).unwrap_err();
    assert!(matches!(err, LoadError::FileNotFound(_)));
}

#[test]
fn test_directory_is_not_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let err = store().load(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::FileNotFound(_)));
}

#[test]
fn test_bad_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.gguf");
    std::fs::write(&path, vec![0x42u8; 256]).unwrap();
    let err = store().load(&path).unwrap_err();
    assert!(matches!(err, LoadError::Format(_)), "{err}");
}

#[test]
fn test_truncated_file() {
    let fixture = tiny_model();
    let bytes = std::fs::read(&fixture.path).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.gguf");
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = store().load(&path).unwrap_err();
    assert!(matches!(err, LoadError::Format(_)), "{err}");
}

#[test]
fn test_tiny_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.gguf");
    std::fs::write(&path, b"GGUF").unwrap();
    assert!(matches!(store().load(&path), Err(LoadError::Format(_))));
}

#[test]
fn test_unsupported_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gpt2.gguf");
    let mut w = GgufWriter::new();
    w.add_string("general.architecture", "gpt2")
        .add_string_array("tokenizer.ggml.tokens", &["a", "b"]);
    w.write_to(&path).unwrap();

    let err = store().load(&path).unwrap_err();
    match err {
        LoadError::Format(msg) => assert!(msg.contains("gpt2"), "{msg}"),
        other => panic!("expected Format, got {other:?}"),
    }
}

#[test]
fn test_size_limit() {
    let fixture = tiny_model();
    let store = ModelStore::new(ModelLoader::new(Some(1024)));
    let err = store.load(&fixture.path).unwrap_err();
    assert!(matches!(err, LoadError::OutOfMemory { limit: 1024, .. }));
}

#[test]
fn test_written_file_parses() {
    let bytes = SynthSpec::default().build().to_bytes();
    let file = gguf::parse(&bytes).unwrap();
    assert_eq!(file.get("general.architecture").and_then(|v| v.as_str()), Some("llama"));
    assert!(file.tensor("token_embd.weight").is_some());
    assert!(file.tensor("blk.1.ffn_down.weight").is_some());
}

// ============================================================================
// Unloading
// ============================================================================

#[test]
fn test_unload_invalidates_handle() {
    let fixture = tiny_model();
    let store = store();
    let handle = store.load(&fixture.path).unwrap();

    assert!(store.unload(handle));
    assert!(!store.contains(handle));
    assert!(store.get(handle).is_none());
    assert!(store.info(handle).is_none());
    assert!(!store.unload(handle), "second unload is a no-op");
}

#[test]
fn test_model_outlives_store_reference() {
    let fixture = tiny_model();
    let store = store();
    let handle = store.load(&fixture.path).unwrap();
    let model = store.get(handle).unwrap();

    store.unload(handle);
    assert_eq!(Arc::strong_count(&model), 1);
    assert_eq!(model.info().name, "synth-tiny");
}

#[test]
fn test_total_bytes_tracks_loaded_models() {
    let fixture = tiny_model();
    let store = store();
    assert_eq!(store.total_bytes(), 0);
    let handle = store.load(&fixture.path).unwrap();
    let size = store.info(handle).unwrap().size_bytes;
    assert_eq!(store.total_bytes(), size);
    store.unload(handle);
    assert_eq!(store.total_bytes(), 0);
}
