//! Inference engine: tokenizer, forward pass, context, sampling and the
//! generation loop.

pub mod config;
pub mod context;
pub mod error;
pub mod ops;
pub mod output;
pub mod quantize;
pub mod sampler;
pub mod stop;
pub mod tokenizer;

mod forward;
mod generation;
mod streaming;

pub use config::{GenerationRequest, SamplingParams};
pub use context::{ContextParams, ContextState, InferenceContext, OverflowPolicy};
pub use error::{ContextError, GenerationError, TokenizerError};
pub use generation::{generate, GenerationControl};
pub use output::{FinishReason, GenerationResult};
pub use sampler::Sampler;
pub use stop::{StopMatcher, StopOutcome};
pub use streaming::FragmentStream;
pub use tokenizer::{StreamDecoder, Token, TokenId, TokenKind, Tokenizer, Vocabulary};
