// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! `infer`: load a model and generate a completion for one prompt.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{flag_value, parse_flag, EXIT_USAGE};
use crate::config;
use crate::engine::GenerationRequest;
use crate::session::SessionManager;
use crate::telemetry;

#[derive(Debug, Default)]
struct InferArgs {
    model: Option<PathBuf>,
    prompt: Option<String>,
    config: Option<PathBuf>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    seed: Option<u64>,
    n_ctx: Option<usize>,
    timeout_ms: Option<u64>,
    stop: Vec<String>,
    stream: bool,
}

fn parse_args(args: &[String]) -> Result<InferArgs, String> {
    let mut out = InferArgs::default();
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--model" => out.model = Some(PathBuf::from(flag_value(args, i)?)),
            "--prompt" => out.prompt = Some(flag_value(args, i)?.to_string()),
            "--config" => out.config = Some(PathBuf::from(flag_value(args, i)?)),
            "--max-tokens" => out.max_tokens = Some(parse_flag(args, i)?),
            "--temperature" => out.temperature = Some(parse_flag(args, i)?),
            "--seed" => out.seed = Some(parse_flag(args, i)?),
            "--n-ctx" => out.n_ctx = Some(parse_flag(args, i)?),
            "--timeout-ms" => out.timeout_ms = Some(parse_flag(args, i)?),
            "--stop" => out.stop.push(flag_value(args, i)?.to_string()),
            "--stream" => {
                out.stream = true;
                i += 1;
                continue;
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
        i += 2;
    }
    Ok(out)
}

/// Run the `infer` command. Returns the process exit code.
pub async fn run_infer(args: &[String]) -> i32 {
    let parsed = match parse_args(args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };
    let (Some(model), Some(prompt)) = (parsed.model.clone(), parsed.prompt.clone()) else {
        eprintln!("Usage: llm-bridge-cli infer --model <PATH> --prompt <TEXT> [--max-tokens N] [--stream]");
        return EXIT_USAGE;
    };

    let mut cfg = match config::load(parsed.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_USAGE;
        }
    };
    if let Some(n) = parsed.n_ctx {
        cfg.context.window_size = n;
    }
    // A second subscriber only happens in tests; ignore it.
    let _ = telemetry::init_logging(&cfg.log);

    let mut request = GenerationRequest {
        prompt,
        stop_sequences: parsed.stop.clone(),
        sampling: cfg.default_sampling.clone(),
        ..GenerationRequest::default()
    };
    if let Some(n) = parsed.max_tokens {
        request.max_new_tokens = n;
    }
    if let Some(t) = parsed.temperature {
        request.sampling.temperature = t;
    }
    if let Some(seed) = parsed.seed {
        request.sampling.seed = seed;
    }
    if let Some(ms) = parsed.timeout_ms {
        request.timeout = Some(Duration::from_millis(ms));
    }

    let manager = Arc::new(SessionManager::new(cfg));
    if let Err(e) = manager.load_model(&model) {
        eprintln!("Error: {e}");
        return 1;
    }

    let mut stream = manager.generate_stream(request);
    let outcome = if parsed.stream {
        let mut stdout = std::io::stdout();
        while let Some(fragment) = stream.next_fragment().await {
            print!("{fragment}");
            let _ = stdout.flush();
        }
        println!();
        stream.result().await
    } else {
        stream.collect_text().await.map(|(text, result)| {
            println!("{text}");
            result
        })
    };

    let code = match outcome {
        Ok(result) => {
            eprintln!(
                "[{}: {} prompt tokens, {} generated, {} ms]",
                result.finish_reason,
                result.prompt_tokens,
                result.tokens_generated(),
                result.elapsed.as_millis()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    if let Err(e) = manager.cleanup() {
        eprintln!("Cleanup failed: {e}");
    }
    code
}
