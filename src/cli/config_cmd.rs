// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read the config file and `LLM_BRIDGE_*` environment
//! variables without loading a model.

use std::path::PathBuf;

use super::{flag_value, EXIT_USAGE};
use crate::config::{self, BridgeConfig};

fn config_path(args: &[String]) -> Result<Option<PathBuf>, String> {
    let mut path = None;
    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                path = Some(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(path)
}

fn load(args: &[String]) -> Result<BridgeConfig, i32> {
    let path = config_path(args).map_err(|e| {
        eprintln!("{e}");
        EXIT_USAGE
    })?;
    config::load(path.as_deref()).map_err(|e| {
        eprintln!("Error: {e}");
        EXIT_USAGE
    })
}

fn print_toml(cfg: &BridgeConfig) -> i32 {
    match cfg.to_toml() {
        Ok(text) => {
            print!("{text}");
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

/// Print the effective config (file plus environment) as TOML.
pub fn run_show(args: &[String]) -> i32 {
    match load(args) {
        Ok(cfg) => print_toml(&cfg),
        Err(code) => code,
    }
}

/// Print built-in defaults, ignoring files and environment.
pub fn run_defaults() -> i32 {
    print_toml(&BridgeConfig::default())
}

/// Check the effective config for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate(args: &[String]) -> i32 {
    let cfg = match load(args) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let warnings = validation_warnings(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {w}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validation_warnings(cfg: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Err(e) = cfg.default_sampling.validate() {
        warnings.push(format!("default_sampling: {e}"));
    }
    let cpus = num_cpus::get();
    if cfg.context.n_threads > cpus {
        warnings.push(format!(
            "context.n_threads ({}) exceeds available CPUs ({cpus})",
            cfg.context.n_threads
        ));
    }
    if cfg.context.batch_size > cfg.context.window_size {
        warnings.push(format!(
            "context.batch_size ({}) > context.window_size ({})",
            cfg.context.batch_size, cfg.context.window_size
        ));
    }
    if let Some(gen) = cfg.generation_timeout() {
        if gen < cfg.lock_timeout() {
            warnings.push(format!(
                "generation_timeout_ms ({}) < lock_timeout_ms ({})",
                cfg.generation_timeout_ms, cfg.lock_timeout_ms
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate_cleanly_apart_from_threads() {
        let warnings = validation_warnings(&BridgeConfig::default());
        assert!(warnings.iter().all(|w| w.contains("n_threads")), "{warnings:?}");
    }

    #[test]
    fn test_oversized_batch_warns() {
        let mut cfg = BridgeConfig::default();
        cfg.context.window_size = 64;
        cfg.context.batch_size = 128;
        let warnings = validation_warnings(&cfg);
        assert!(warnings.iter().any(|w| w.contains("batch_size")));
    }

    #[test]
    fn test_bad_sampling_warns() {
        let mut cfg = BridgeConfig::default();
        cfg.default_sampling.top_p = 2.0;
        let warnings = validation_warnings(&cfg);
        assert!(warnings.iter().any(|w| w.starts_with("default_sampling")));
    }

    #[test]
    fn test_config_path_rejects_unknown() {
        let args: Vec<String> = ["llm-bridge-cli", "config", "show", "--json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(config_path(&args).is_err());
    }
}
