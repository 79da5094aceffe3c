//! Engine error types.
//!
//! Each layer has its own enum; the session manager is the only place they
//! are folded into the external error set.

use thiserror::Error;

pub use super::tokenizer::TokenizerError;

/// Errors from creating or driving an inference context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Invalid model handle: {0}")]
    InvalidModel(String),

    #[error("Invalid window size {requested}: must be between 1 and {max}")]
    InvalidWindowSize { requested: usize, max: usize },

    #[error("Invalid batch size: must be at least 1")]
    InvalidBatchSize,

    #[error("Out of memory: KV cache needs {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("Context overflow: {needed} tokens do not fit in a window of {capacity}")]
    ContextOverflow { needed: usize, capacity: usize },

    #[error("Invalid token ID {id} for vocabulary of {vocab_size}")]
    InvalidToken { id: u32, vocab_size: usize },

    #[error("Context has been destroyed")]
    Destroyed,
}

/// Errors from a generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

impl GenerationError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Tokenizer(_) => "tokenizer",
            Self::Context(e) => match e {
                ContextError::InvalidModel(_) => "invalid_model",
                ContextError::InvalidWindowSize { .. } | ContextError::InvalidBatchSize => {
                    "invalid_window_size"
                }
                ContextError::OutOfMemory { .. } => "out_of_memory",
                ContextError::ContextOverflow { .. } => "context_overflow",
                ContextError::InvalidToken { .. } => "invalid_token",
                ContextError::Destroyed => "destroyed",
            },
        }
    }
}
