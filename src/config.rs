//! Bridge configuration: defaults, optional TOML file, environment overrides.
//!
//! Sources are applied in that order. Invalid environment values fall back to
//! the current value without failing; out-of-range values are clamped.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `LLM_BRIDGE_CONFIG` | unset | Path to a TOML config file |
//! | `LLM_BRIDGE_N_CTX` | 2048 | Context window size (tokens) |
//! | `LLM_BRIDGE_N_THREADS` | 4 | Inference threads (0 = auto) |
//! | `LLM_BRIDGE_BATCH_SIZE` | 512 | Prompt evaluation batch size |
//! | `LLM_BRIDGE_OVERFLOW` | sliding_window | `sliding_window` or `fail` |
//! | `LLM_BRIDGE_GENERATION_TIMEOUT_MS` | 120000 | Per-request wall time (0 = none) |
//! | `LLM_BRIDGE_LOCK_TIMEOUT_MS` | 2000 | Wait for an in-flight generation |
//! | `LLM_BRIDGE_MAX_MODEL_BYTES` | 0 | Model file size ceiling (0 = none) |
//! | `LLM_BRIDGE_LOG_LEVEL` | warn,llm_bridge=info | Log filter directive |
//! | `LLM_BRIDGE_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{ContextParams, OverflowPolicy, SamplingParams};
use crate::telemetry::LogConfig;

/// Smallest window the env override accepts.
const MIN_WINDOW: usize = 16;
const MAX_WINDOW: usize = 1 << 20;
const MAX_THREADS: usize = 256;
const MIN_LOCK_TIMEOUT_MS: u64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// All bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub context: ContextParams,
    /// Default per-request wall-time limit; 0 disables.
    pub generation_timeout_ms: u64,
    /// How long load/unload/create wait for an in-flight generation.
    pub lock_timeout_ms: u64,
    /// Reject model files above this size.
    pub max_model_bytes: Option<u64>,
    pub default_sampling: SamplingParams,
    pub log: LogConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            context: ContextParams::default(),
            generation_timeout_ms: 120_000,
            lock_timeout_ms: 2_000,
            max_model_bytes: None,
            default_sampling: SamplingParams::default(),
            log: LogConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn generation_timeout(&self) -> Option<Duration> {
        match self.generation_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Self>(text)?.sanitized())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `LLM_BRIDGE_*` overrides on top of `self`.
    pub fn with_env(mut self) -> Self {
        let ctx = &mut self.context;
        ctx.window_size = parse_usize("LLM_BRIDGE_N_CTX", ctx.window_size);
        ctx.n_threads = parse_usize("LLM_BRIDGE_N_THREADS", ctx.n_threads);
        ctx.batch_size = parse_usize("LLM_BRIDGE_BATCH_SIZE", ctx.batch_size);
        if let Ok(v) = std::env::var("LLM_BRIDGE_OVERFLOW") {
            match v.to_ascii_lowercase().as_str() {
                "sliding_window" | "sliding" => ctx.overflow = OverflowPolicy::SlidingWindow,
                "fail" => ctx.overflow = OverflowPolicy::Fail,
                _ => {}
            }
        }

        self.generation_timeout_ms =
            parse_u64("LLM_BRIDGE_GENERATION_TIMEOUT_MS", self.generation_timeout_ms);
        self.lock_timeout_ms = parse_u64("LLM_BRIDGE_LOCK_TIMEOUT_MS", self.lock_timeout_ms);
        match parse_u64("LLM_BRIDGE_MAX_MODEL_BYTES", self.max_model_bytes.unwrap_or(0)) {
            0 => self.max_model_bytes = None,
            n => self.max_model_bytes = Some(n),
        }

        if let Ok(level) = std::env::var("LLM_BRIDGE_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(format) = std::env::var("LLM_BRIDGE_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.log.format = format;
        }
        self.sanitized()
    }

    /// Clamp values into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        let ctx = &mut self.context;
        ctx.window_size = ctx.window_size.clamp(1, MAX_WINDOW);
        ctx.n_threads = ctx.n_threads.min(MAX_THREADS);
        ctx.batch_size = ctx.batch_size.max(1);
        self.lock_timeout_ms = self.lock_timeout_ms.max(MIN_LOCK_TIMEOUT_MS);
        self
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Load configuration: defaults, then `path` (or `LLM_BRIDGE_CONFIG`), then
/// the environment.
pub fn load(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let from_env = std::env::var_os("LLM_BRIDGE_CONFIG").map(PathBuf::from);
    let base = match path.map(Path::to_path_buf).or(from_env) {
        Some(p) => BridgeConfig::from_file(&p)?,
        None => BridgeConfig::default(),
    };
    let mut config = base.with_env();
    // The env floor only applies to values coming from the environment.
    if std::env::var("LLM_BRIDGE_N_CTX").is_ok() {
        config.context.window_size = config.context.window_size.max(MIN_WINDOW);
    }
    Ok(config)
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}
