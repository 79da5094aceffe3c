//! String-in, string-out facade for the host application.
//!
//! Mirrors the narrow surface the app layer calls: load a model, ask for a
//! response, query state, clean up. Failures never escape as panics or
//! `Err`; they come back as `false` or as a message prefixed `"Error: "`.

use std::path::Path;

use crate::config::BridgeConfig;
use crate::engine::GenerationRequest;
use crate::session::{SessionError, SessionManager};

/// Prefix on every error string returned by `generate_response`.
pub const ERROR_PREFIX: &str = "Error: ";

pub struct Bridge {
    session: SessionManager,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { session: SessionManager::new(config) }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn load_model(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.session.load_model(path) {
            Ok(info) => {
                tracing::info!(path = %path.display(), name = %info.name, "Bridge model ready");
                true
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Bridge model load failed");
                false
            }
        }
    }

    /// Generate a reply from a fresh session.
    ///
    /// `max_tokens <= 0` returns an empty string without touching the model.
    /// Cancelled or timed-out runs return whatever text was produced.
    pub fn generate_response(&self, prompt: &str, max_tokens: i32) -> String {
        let Ok(max_new_tokens) = usize::try_from(max_tokens) else {
            return String::new();
        };
        if max_new_tokens == 0 {
            return String::new();
        }
        match self.try_generate(prompt, max_new_tokens) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Bridge generation failed");
                format!("{ERROR_PREFIX}{e}")
            }
        }
    }

    fn try_generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, SessionError> {
        if !self.session.is_model_loaded() {
            return Err(SessionError::NotLoaded);
        }
        self.session.reset_session()?;

        let config = self.session.config();
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            max_new_tokens,
            sampling: config.default_sampling.clone(),
            ..GenerationRequest::default()
        };
        let result = self.session.generate(&request, |_| {})?;
        Ok(result.text())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.session.is_model_loaded()
    }

    /// Human-readable load state, path and size.
    pub fn get_model_info(&self) -> String {
        match self.session.model_info() {
            Some(info) => format!(
                "Model loaded: {} ({}, {}, {} bytes) at {}",
                info.name,
                info.architecture,
                info.quantization,
                info.size_bytes,
                info.path.display()
            ),
            None => "No model loaded".to_string(),
        }
    }

    /// Request cancellation of the running generation.
    pub fn cancel(&self) -> bool {
        self.session.cancel()
    }

    /// Unload the model and destroy the session. Safe to call repeatedly.
    ///
    /// Returns `false` if a generation still held the session after the
    /// lock timeout; the model stays loaded and the call can be repeated.
    pub fn cleanup(&self) -> bool {
        match self.session.cleanup() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Bridge cleanup incomplete");
                false
            }
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}
