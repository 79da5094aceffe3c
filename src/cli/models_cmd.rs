// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Models CLI subcommands: info, synth.

use std::path::PathBuf;

use super::{flag_value, parse_flag, EXIT_USAGE};
use crate::models::gguf::TensorType;
use crate::models::synth::SynthSpec;
use crate::models::{ModelLoader, ModelStore};

/// Run `models info --model PATH`: print the model's metadata as JSON.
pub fn run_info(args: &[String]) -> i32 {
    let mut model = None;
    let mut json = true;
    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--model" => match flag_value(args, i) {
                Ok(v) => {
                    model = Some(PathBuf::from(v));
                    i += 2;
                }
                Err(e) => {
                    eprintln!("{e}");
                    return EXIT_USAGE;
                }
            },
            "--text" => {
                json = false;
                i += 1;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                return EXIT_USAGE;
            }
        }
    }
    let Some(path) = model else {
        eprintln!("Usage: llm-bridge-cli models info --model <PATH> [--text]");
        return EXIT_USAGE;
    };

    let store = ModelStore::new(ModelLoader::new(None));
    let handle = match store.load(&path) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };
    let Some(info) = store.info(handle) else {
        eprintln!("Error: {handle} not found after load");
        return 1;
    };

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        }
    } else {
        let hp = &info.hparams;
        println!("{:<16} {}", "NAME", info.name);
        println!("{:<16} {}", "ARCHITECTURE", info.architecture);
        println!("{:<16} {}", "QUANTIZATION", info.quantization);
        println!("{:<16} {}", "SIZE (bytes)", info.size_bytes);
        println!("{:<16} {}", "VOCAB", info.vocab_size);
        println!("{:<16} {}", "TRAINED CTX", hp.n_ctx_train);
        println!("{:<16} {} x {}", "LAYERS x EMBD", hp.n_layer, hp.n_embd);
        println!("{:<16} {}/{}", "HEADS (Q/KV)", hp.n_head, hp.n_head_kv);
        println!("{:<16} {}", "FINGERPRINT", info.fingerprint);
    }
    store.unload(handle);
    0
}

/// Run `models synth --out PATH`: write a tiny random-weight model.
pub fn run_synth(args: &[String]) -> i32 {
    match parse_synth(args) {
        Ok((out, spec)) => match spec.write_to(&out) {
            Ok(()) => {
                println!("Wrote {} ({} weights) to {}", spec.name, spec.weight_type, out.display());
                0
            }
            Err(e) => {
                eprintln!("Error: failed to write {}: {e}", out.display());
                1
            }
        },
        Err(e) => {
            eprintln!("{e}");
            EXIT_USAGE
        }
    }
}

fn parse_synth(args: &[String]) -> Result<(PathBuf, SynthSpec), String> {
    let mut out = None;
    let mut spec = SynthSpec::default();
    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--out" => out = Some(PathBuf::from(flag_value(args, i)?)),
            "--seed" => spec.seed = parse_flag(args, i)?,
            "--layers" => spec.n_layer = parse_flag(args, i)?,
            "--ctx" => spec.n_ctx_train = parse_flag(args, i)?,
            "--name" => spec.name = flag_value(args, i)?.to_string(),
            "--type" => {
                spec.weight_type = match flag_value(args, i)?.to_ascii_lowercase().as_str() {
                    "f32" => TensorType::F32,
                    "f16" => TensorType::F16,
                    "q8_0" => TensorType::Q8_0,
                    other => return Err(format!("Unsupported weight type: {other}")),
                }
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
        i += 2;
    }
    let out = out.ok_or("Usage: llm-bridge-cli models synth --out <PATH> [--seed N] [--type f32|f16|q8_0]")?;
    if spec.n_layer == 0 || spec.n_ctx_train == 0 {
        return Err("--layers and --ctx must be positive".to_string());
    }
    Ok((out, spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        ["llm-bridge-cli", "models", "synth"]
            .iter()
            .chain(items)
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_synth_options() {
        let (out, spec) =
            parse_synth(&args(&["--out", "t.gguf", "--seed", "9", "--type", "Q8_0"])).unwrap();
        assert_eq!(out, PathBuf::from("t.gguf"));
        assert_eq!(spec.seed, 9);
        assert_eq!(spec.weight_type, TensorType::Q8_0);
    }

    #[test]
    fn test_parse_synth_requires_out() {
        assert!(parse_synth(&args(&["--seed", "1"])).is_err());
    }

    #[test]
    fn test_parse_synth_rejects_unknown_type() {
        let err = parse_synth(&args(&["--out", "t.gguf", "--type", "q4_k"])).unwrap_err();
        assert!(err.contains("q4_k"));
    }

    #[test]
    fn test_synth_then_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gguf");
        let path_str = path.to_str().unwrap();
        assert_eq!(run_synth(&args(&["--out", path_str])), 0);

        let info_args: Vec<String> = ["llm-bridge-cli", "models", "info", "--model", path_str]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(run_info(&info_args), 0);
    }
}
