// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for the `llm-bridge-cli` binary.
//!
//! Every command runs in-process against a local model file; there is no
//! server to connect to.
//!
//! ## Usage
//!
//! ```bash
//! llm-bridge-cli infer --model m.gguf --prompt "Hello"   # Generate text
//! llm-bridge-cli models info --model m.gguf              # Print model metadata
//! llm-bridge-cli models synth --out tiny.gguf            # Write a test model
//! llm-bridge-cli config show                             # Effective config
//! ```

pub mod config_cmd;
pub mod infer_cmd;
pub mod models_cmd;

pub use infer_cmd::run_infer;

/// Exit code for bad arguments or configuration.
pub const EXIT_USAGE: i32 = 2;

/// Value following the flag at `args[i]`, or an error naming the flag.
pub(crate) fn flag_value<'a>(args: &'a [String], i: usize) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", args[i]))
}

/// Parse the value following the flag at `args[i]`.
pub(crate) fn parse_flag<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, String> {
    let raw = flag_value(args, i)?;
    raw.parse()
        .map_err(|_| format!("Invalid value for {}: {}", args[i], raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value_present() {
        let a = args(&["infer", "--model", "m.gguf"]);
        assert_eq!(flag_value(&a, 1).unwrap(), "m.gguf");
    }

    #[test]
    fn test_flag_value_missing() {
        let a = args(&["infer", "--model"]);
        assert_eq!(flag_value(&a, 1).unwrap_err(), "Missing value for --model");
    }

    #[test]
    fn test_parse_flag_invalid() {
        let a = args(&["infer", "--max-tokens", "lots"]);
        let err = parse_flag::<usize>(&a, 1).unwrap_err();
        assert!(err.contains("--max-tokens"));
        assert!(err.contains("lots"));
    }
}
