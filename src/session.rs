//! Session manager: the single active (model, context) pair behind a
//! serialized facade.
//!
//! At most one generation runs at a time. An overlapping `generate` fails
//! immediately with `Busy`; load, unload and session creation wait up to the
//! configured lock timeout for the running generation to finish.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::engine::{
    self, ContextError, ContextParams, FragmentStream, GenerationControl, GenerationError,
    GenerationRequest, GenerationResult, InferenceContext, TokenizerError,
};
use crate::models::{LoadError, ModelHandle, ModelInfo, ModelLoader, ModelStore};

/// External error set. Every internal error is folded into one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Model file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid model format: {0}")]
    FormatError(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid window size: {0}")]
    InvalidWindowSize(String),

    #[error("Context overflow: {0}")]
    ContextOverflow(String),

    #[error("Session busy: another operation is in flight")]
    Busy,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Generation timed out")]
    TimedOut,

    #[error("No model loaded")]
    NotLoaded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Stable numeric codes for `SessionError`, used across the C ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FileNotFound = 1,
    FormatError = 2,
    OutOfMemory = 3,
    InvalidModel = 4,
    InvalidWindowSize = 5,
    ContextOverflow = 6,
    Busy = 7,
    Cancelled = 8,
    TimedOut = 9,
    NotLoaded = 10,
    InvalidRequest = 11,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::FormatError(_) => ErrorKind::FormatError,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::InvalidModel(_) => ErrorKind::InvalidModel,
            Self::InvalidWindowSize(_) => ErrorKind::InvalidWindowSize,
            Self::ContextOverflow(_) => ErrorKind::ContextOverflow,
            Self::Busy => ErrorKind::Busy,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TimedOut => ErrorKind::TimedOut,
            Self::NotLoaded => ErrorKind::NotLoaded,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

impl From<LoadError> for SessionError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::FileNotFound(p) => Self::FileNotFound(p.display().to_string()),
            LoadError::Format(msg) => Self::FormatError(msg),
            e @ LoadError::OutOfMemory { .. } => Self::OutOfMemory(e.to_string()),
            LoadError::Io(e) => Self::FileNotFound(e.to_string()),
        }
    }
}

impl From<ContextError> for SessionError {
    fn from(e: ContextError) -> Self {
        let msg = e.to_string();
        match e {
            ContextError::InvalidModel(_) | ContextError::InvalidToken { .. } => {
                Self::InvalidModel(msg)
            }
            ContextError::InvalidWindowSize { .. } | ContextError::InvalidBatchSize => {
                Self::InvalidWindowSize(msg)
            }
            ContextError::OutOfMemory { .. } => Self::OutOfMemory(msg),
            ContextError::ContextOverflow { .. } => Self::ContextOverflow(msg),
            ContextError::Destroyed => Self::NotLoaded,
        }
    }
}

impl From<GenerationError> for SessionError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            GenerationError::Context(e) => e.into(),
            GenerationError::Tokenizer(e @ TokenizerError::Unrepresentable(_)) => {
                Self::InvalidRequest(e.to_string())
            }
            GenerationError::Tokenizer(e) => Self::InvalidModel(e.to_string()),
        }
    }
}

struct ActiveModel {
    handle: ModelHandle,
    info: ModelInfo,
}

/// Clears the in-flight cancellation token when a generation ends.
struct FlightGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl<'a> FlightGuard<'a> {
    fn new(slot: &'a Mutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *slot.lock() = Some(token);
        Self { slot }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Caller-owned facade over one model and one inference context.
pub struct SessionManager {
    config: BridgeConfig,
    store: ModelStore,
    model: RwLock<Option<ActiveModel>>,
    context: Mutex<Option<InferenceContext>>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    pub fn new(config: BridgeConfig) -> Self {
        let store = ModelStore::new(ModelLoader::new(config.max_model_bytes));
        Self {
            config,
            store,
            model: RwLock::new(None),
            context: Mutex::new(None),
            in_flight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Load a model, replacing any current one and its session.
    pub fn load_model(&self, path: &Path) -> Result<ModelInfo, SessionError> {
        let mut session = self
            .context
            .try_lock_for(self.config.lock_timeout())
            .ok_or(SessionError::Busy)?;

        let handle = self.store.load(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Model load failed");
            SessionError::from(e)
        })?;
        let info = self.store.info(handle).ok_or_else(|| {
            SessionError::InvalidModel(format!("{handle} vanished after load"))
        })?;

        if let Some(mut ctx) = session.take() {
            ctx.destroy();
        }
        let previous = self.model.write().replace(ActiveModel { handle, info: info.clone() });
        if let Some(prev) = previous {
            self.store.unload(prev.handle);
        }
        Ok(info)
    }

    /// Unload the current model. Returns `false` if none was loaded.
    pub fn unload_model(&self) -> Result<bool, SessionError> {
        let mut session = self
            .context
            .try_lock_for(self.config.lock_timeout())
            .ok_or(SessionError::Busy)?;
        Ok(self.unload_locked(&mut session))
    }

    fn unload_locked(&self, session: &mut Option<InferenceContext>) -> bool {
        if let Some(mut ctx) = session.take() {
            ctx.destroy();
        }
        match self.model.write().take() {
            Some(active) => self.store.unload(active.handle),
            None => false,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.model.read().as_ref().map(|m| m.info.clone())
    }

    /// Replace the session with a fresh context built from `params`.
    pub fn create_session(&self, params: &ContextParams) -> Result<(), SessionError> {
        let mut session = self
            .context
            .try_lock_for(self.config.lock_timeout())
            .ok_or(SessionError::Busy)?;
        let handle = self.active_handle()?;

        if let Some(mut old) = session.take() {
            old.destroy();
        }
        *session = Some(InferenceContext::create(&self.store, handle, params)?);
        Ok(())
    }

    /// Clear the session's history. A missing session is not an error.
    pub fn reset_session(&self) -> Result<(), SessionError> {
        let mut session = self
            .context
            .try_lock_for(self.config.lock_timeout())
            .ok_or(SessionError::Busy)?;
        if let Some(ctx) = session.as_mut() {
            ctx.reset();
        }
        Ok(())
    }

    /// Generate synchronously, passing each fragment to `on_fragment`.
    pub fn generate<F>(
        &self,
        request: &GenerationRequest,
        on_fragment: F,
    ) -> Result<GenerationResult, SessionError>
    where
        F: FnMut(&str),
    {
        self.generate_with(request, CancellationToken::new(), on_fragment)
    }

    pub(crate) fn generate_with<F>(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
        on_fragment: F,
    ) -> Result<GenerationResult, SessionError>
    where
        F: FnMut(&str),
    {
        let handle = self.active_handle()?;
        let mut session = self.context.try_lock().ok_or_else(|| {
            tracing::debug!("Generation rejected: another generation is in flight");
            SessionError::Busy
        })?;

        if session.is_none() {
            *session = Some(InferenceContext::create(&self.store, handle, &self.config.context)?);
        }
        let Some(ctx) = session.as_mut() else {
            return Err(SessionError::NotLoaded);
        };

        let deadline = request
            .timeout
            .or_else(|| self.config.generation_timeout())
            .map(|t| Instant::now() + t);
        let control = GenerationControl::new(cancel.clone(), deadline);
        let _flight = FlightGuard::new(&self.in_flight, cancel);

        Ok(engine::generate(ctx, request, &control, on_fragment)?)
    }

    /// Generate on a blocking thread, streaming fragments.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn generate_stream(self: &Arc<Self>, request: GenerationRequest) -> FragmentStream {
        let cancel = CancellationToken::new();
        let (tx, stream) = FragmentStream::channel(cancel.clone());
        let manager = Arc::clone(self);
        let task_cancel = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            manager.generate_with(&request, task_cancel.clone(), |fragment| {
                // Receiver gone: nobody is listening, stop early.
                if tx.blocking_send(fragment.to_string()).is_err() {
                    task_cancel.cancel();
                }
            })
        });
        stream.with_task(handle)
    }

    /// Cancel the in-flight generation, if any.
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel any generation, then unload the model and destroy the session.
    /// Idempotent.
    pub fn cleanup(&self) -> Result<(), SessionError> {
        self.cancel();
        let mut session = self
            .context
            .try_lock_for(self.config.lock_timeout())
            .ok_or(SessionError::Busy)?;
        if self.unload_locked(&mut session) {
            tracing::info!("Session cleaned up");
        }
        Ok(())
    }

    fn active_handle(&self) -> Result<ModelHandle, SessionError> {
        self.model
            .read()
            .as_ref()
            .map(|m| m.handle)
            .ok_or(SessionError::NotLoaded)
    }

    /// Tokens currently held by the session.
    pub fn session_position(&self) -> Option<usize> {
        self.context.try_lock()?.as_ref().map(InferenceContext::position)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let session = self.context.get_mut();
        if let Some(mut ctx) = session.take() {
            ctx.destroy();
        }
        if let Some(active) = self.model.get_mut().take() {
            self.store.unload(active.handle);
        }
    }
}
