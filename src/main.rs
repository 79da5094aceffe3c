//! llm-bridge command-line entry point.
//!
//! Runs the session manager in-process against a local GGUF file.
//!
//! ## CLI Subcommands
//!
//! - `llm-bridge-cli infer` - Generate text from a prompt
//! - `llm-bridge-cli models info` - Print model metadata
//! - `llm-bridge-cli models synth` - Write a tiny random-weight model
//! - `llm-bridge-cli config show` - Print the effective configuration

use std::process::ExitCode;

use llm_bridge::cli::{config_cmd, models_cmd, run_infer};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "infer" => {
            let code = run_infer(&args).await;
            ExitCode::from(code as u8)
        }
        "models" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("");
            match subcommand {
                "info" => ExitCode::from(models_cmd::run_info(&args) as u8),
                "synth" => ExitCode::from(models_cmd::run_synth(&args) as u8),
                _ => {
                    eprintln!("Unknown models subcommand: {}", subcommand);
                    print_command_help("models");
                    ExitCode::FAILURE
                }
            }
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show(&args) as u8),
                "defaults" => ExitCode::from(config_cmd::run_defaults() as u8),
                "validate" => ExitCode::from(config_cmd::run_validate(&args) as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("llm-bridge {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "llm-bridge - Local language model session manager v{}

USAGE:
    llm-bridge-cli <COMMAND> [OPTIONS]

COMMANDS:
    infer        Generate a completion for a prompt (supports streaming)
    models       Inspect or synthesize model files (info, synth)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    llm-bridge-cli infer --model model.gguf --prompt \"Hello\"
    llm-bridge-cli infer --model model.gguf --prompt \"Hi\" --stream
    llm-bridge-cli models synth --out tiny.gguf --seed 7
    llm-bridge-cli models info --model tiny.gguf
    llm-bridge-cli config show --config bridge.toml

ENVIRONMENT:
    LLM_BRIDGE_CONFIG      Path to a TOML config file
    LLM_BRIDGE_N_CTX       Context window size in tokens
    LLM_BRIDGE_LOG_LEVEL   Log filter (debug, info, warn, error)
    LLM_BRIDGE_LOG_FORMAT  json or pretty

EXIT CODES:
    0  Success
    1  Runtime failure
    2  Usage or configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "infer" => {
            eprintln!(
                "llm-bridge-cli infer - Generate a completion

USAGE:
    llm-bridge-cli infer --model <PATH> --prompt <TEXT> [OPTIONS]

OPTIONS:
    --model PATH        GGUF model file (required)
    --prompt TEXT       Prompt text (required)
    --max-tokens N      Maximum tokens to generate (default: 256)
    --temperature F     Sampling temperature, 0 for greedy
    --seed N            Sampling seed
    --stop TEXT         Stop sequence (repeatable)
    --n-ctx N           Context window size
    --timeout-ms N      Wall-time limit for this request
    --config FILE       Load configuration from file
    --stream            Print fragments as they are produced

DESCRIPTION:
    Loads the model, generates one completion and prints it to stdout.
    The finish reason and token counts go to stderr.
"
            );
        }
        "models" => {
            eprintln!(
                "llm-bridge-cli models - Inspect or synthesize model files

USAGE:
    llm-bridge-cli models info --model <PATH> [--text]
    llm-bridge-cli models synth --out <PATH> [OPTIONS]

SYNTH OPTIONS:
    --seed N            Weight seed (default: 42)
    --type TYPE         f32, f16 or q8_0 (default: f32)
    --layers N          Transformer blocks (default: 2)
    --ctx N             Trained context length (default: 128)
    --name NAME         general.name metadata value
"
            );
        }
        "config" => {
            eprintln!(
                "llm-bridge-cli config - Inspect configuration

USAGE:
    llm-bridge-cli config show [--config FILE]
    llm-bridge-cli config defaults
    llm-bridge-cli config validate [--config FILE]

DESCRIPTION:
    show      Effective configuration after file and environment overrides
    defaults  Built-in defaults
    validate  Warn about suspicious settings (exit 1 on warnings)
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}
