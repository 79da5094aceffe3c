//! Inference context: per-session KV cache, token history and last logits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::ContextError;
use super::forward::{forward, KvCache, Scratch};
use super::tokenizer::TokenId;
use crate::models::{Model, ModelHandle, ModelStore};

/// Upper bound on auto-detected worker threads.
const MAX_AUTO_THREADS: usize = 16;

/// What happens when a call needs more positions than the window has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the oldest tokens and re-evaluate the rest.
    #[default]
    SlidingWindow,
    /// Fail with `ContextOverflow`.
    Fail,
}

/// Context creation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    /// Window capacity in tokens.
    pub window_size: usize,
    /// 0 = number of logical CPUs, capped at 16.
    pub n_threads: usize,
    /// Most tokens evaluated per batch.
    pub batch_size: usize,
    pub overflow: OverflowPolicy,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            window_size: 2048,
            n_threads: 4,
            batch_size: 512,
            overflow: OverflowPolicy::SlidingWindow,
        }
    }
}

impl ContextParams {
    pub fn with_window(window_size: usize) -> Self {
        Self { window_size, ..Self::default() }
    }

    fn resolved_threads(&self) -> usize {
        match self.n_threads {
            0 => num_cpus::get().clamp(1, MAX_AUTO_THREADS),
            n => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Nothing evaluated since creation or the last reset.
    Created,
    Active,
    Destroyed,
}

/// Saved history length and logits, for rolling back a failed call.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    len: usize,
    logits: Option<Vec<f32>>,
    state: ContextState,
}

/// Mutable inference state bound to one model.
///
/// Holds a strong reference to the model, so the weights outlive every
/// context created from them.
pub struct InferenceContext {
    model: Option<Arc<Model>>,
    cache: Option<KvCache>,
    scratch: Option<Scratch>,
    capacity: usize,
    n_threads: usize,
    batch_size: usize,
    overflow: OverflowPolicy,
    history: Vec<TokenId>,
    has_logits: bool,
    state: ContextState,
}

impl InferenceContext {
    /// Create a context for a model held by `store`.
    pub fn create(
        store: &ModelStore,
        handle: ModelHandle,
        params: &ContextParams,
    ) -> Result<Self, ContextError> {
        let model = store
            .get(handle)
            .ok_or_else(|| ContextError::InvalidModel(handle.to_string()))?;
        Self::new(model, params)
    }

    pub fn new(model: Arc<Model>, params: &ContextParams) -> Result<Self, ContextError> {
        let hp = *model.hparams();
        if params.window_size == 0 || params.window_size > hp.n_ctx_train {
            return Err(ContextError::InvalidWindowSize {
                requested: params.window_size,
                max: hp.n_ctx_train,
            });
        }
        if params.batch_size == 0 {
            return Err(ContextError::InvalidBatchSize);
        }

        let cache = KvCache::allocate(hp.n_layer, params.window_size, hp.kv_dim())
            .map_err(|bytes| ContextError::OutOfMemory { bytes })?;
        let scratch = Scratch::new(&model, params.window_size);
        let n_threads = params.resolved_threads();

        tracing::debug!(
            window_size = params.window_size,
            n_threads,
            batch_size = params.batch_size,
            kv_cache_bytes = cache.size_bytes(),
            "Inference context created"
        );

        Ok(Self {
            model: Some(model),
            cache: Some(cache),
            scratch: Some(scratch),
            capacity: params.window_size,
            n_threads,
            batch_size: params.batch_size,
            overflow: params.overflow,
            history: Vec::with_capacity(params.window_size),
            has_logits: false,
            state: ContextState::Created,
        })
    }

    /// Evaluate `tokens` after the current history, in batches of at most
    /// `batch_size`, keeping the logits of the final token.
    pub fn evaluate(&mut self, tokens: &[TokenId]) -> Result<(), ContextError> {
        let (Some(model), Some(cache), Some(scratch)) =
            (self.model.as_deref(), self.cache.as_mut(), self.scratch.as_mut())
        else {
            return Err(ContextError::Destroyed);
        };
        if tokens.is_empty() {
            return Ok(());
        }

        let vocab_size = model.hparams().n_vocab;
        if let Some(&id) = tokens.iter().find(|&&id| id as usize >= vocab_size) {
            return Err(ContextError::InvalidToken { id, vocab_size });
        }
        let needed = self.history.len() + tokens.len();
        if needed > self.capacity {
            return Err(ContextError::ContextOverflow { needed, capacity: self.capacity });
        }

        let last = tokens.len() - 1;
        for (b, batch) in tokens.chunks(self.batch_size).enumerate() {
            for (i, &token) in batch.iter().enumerate() {
                let want_logits = b * self.batch_size + i == last;
                let pos = self.history.len();
                forward(model, cache, scratch, token, pos, self.n_threads, want_logits);
                self.history.push(token);
            }
        }

        self.has_logits = true;
        self.state = ContextState::Active;
        Ok(())
    }

    /// Logits of the most recently evaluated token.
    pub fn logits(&self) -> Option<&[f32]> {
        match (&self.scratch, self.has_logits) {
            (Some(s), true) => Some(s.logits.as_slice()),
            _ => None,
        }
    }

    /// Clear cache, history and logits. Never fails.
    pub fn reset(&mut self) {
        self.history.clear();
        self.has_logits = false;
        if self.state != ContextState::Destroyed {
            self.state = ContextState::Created;
        }
    }

    /// Release the cache and the model reference. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == ContextState::Destroyed {
            return;
        }
        self.cache = None;
        self.scratch = None;
        self.model = None;
        self.history = Vec::new();
        self.has_logits = false;
        self.state = ContextState::Destroyed;
        tracing::debug!("Inference context destroyed");
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.history.len(),
            logits: self.logits().map(<[f32]>::to_vec),
            state: self.state,
        }
    }

    /// Return to a checkpoint taken earlier in the same call.
    ///
    /// Cache slots past the restored position are stale but never read.
    pub fn restore(&mut self, cp: Checkpoint) {
        if self.state == ContextState::Destroyed || cp.len > self.history.len() {
            return;
        }
        self.history.truncate(cp.len);
        match (cp.logits, self.scratch.as_mut()) {
            (Some(saved), Some(s)) => {
                s.logits.copy_from_slice(&saved);
                self.has_logits = true;
            }
            _ => self.has_logits = false,
        }
        self.state = cp.state;
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn history(&self) -> &[TokenId] {
        &self.history
    }

    /// Occupied positions.
    pub fn position(&self) -> usize {
        self.history.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.history.len()
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ContextState::Destroyed
    }
}

impl Drop for InferenceContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("capacity", &self.capacity)
            .field("position", &self.history.len())
            .field("state", &self.state)
            .finish()
    }
}
