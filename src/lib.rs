//! llm-bridge
//!
//! A native inference-session manager. Loads a GGUF language model from disk,
//! keeps one inference context per session, and turns prompts into streamed
//! text through a tokenize → evaluate → sample → detokenize loop.
//!
//! # Layers
//!
//! - `models`: GGUF parsing, memory mapping, handle registry
//! - `engine`: tokenizer, forward pass, context, sampler, generation loop
//! - `session`: the serialized facade and external error set
//! - `bridge`: the string/bool surface the host app calls
//! - `ffi` (feature `ffi`): C ABI over `bridge`
//! - `config`, `telemetry`: TOML/env configuration, tracing and metrics
//! - `cli`: subcommands behind the `llm-bridge-cli` binary
//!
//! # Example
//!
//! ```no_run
//! use llm_bridge::{BridgeConfig, GenerationRequest, SessionManager};
//!
//! let manager = SessionManager::new(BridgeConfig::default());
//! manager.load_model("model.gguf".as_ref())?;
//! let result = manager.generate(&GenerationRequest::new("Hello", 32), |fragment| {
//!     print!("{fragment}");
//! })?;
//! println!("\n[{}]", result.finish_reason);
//! # Ok::<(), llm_bridge::SessionError>(())
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod models;
pub mod session;
pub mod telemetry;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use engine::{
    ContextParams, FinishReason, FragmentStream, GenerationRequest, GenerationResult,
    OverflowPolicy, SamplingParams,
};
pub use models::{ModelHandle, ModelInfo, ModelStore};
pub use session::{ErrorKind, SessionError, SessionManager};
