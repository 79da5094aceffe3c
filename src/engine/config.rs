//! Generation request and sampling parameters.
//!
//! All fields have safe defaults. Requests are validated before any token is
//! evaluated.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::GenerationError;

/// Longest stop sequence accepted, in bytes.
pub const MAX_STOP_SEQUENCE_BYTES: usize = 256;

/// Most stop sequences accepted per request.
pub const MAX_STOP_SEQUENCES: usize = 16;

/// Token sampling controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// 0.0 = greedy argmax.
    pub temperature: f32,
    /// Nucleus threshold in (0.0, 1.0]; 1.0 disables.
    pub top_p: f32,
    /// 0 disables.
    pub top_k: usize,
    /// 1.0 = no penalty.
    pub repeat_penalty: f32,
    /// How many recent tokens the penalty looks at.
    pub repeat_last_n: usize,
    pub seed: u64,
    /// Keep sampling past end-of-sequence.
    pub ignore_eos: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            seed: 0x5EED,
            ignore_eos: false,
        }
    }
}

impl SamplingParams {
    /// Deterministic argmax decoding with no penalty.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 0,
            repeat_penalty: 1.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GenerationError::InvalidRequest(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GenerationError::InvalidRequest(
                "top_p must be in range (0.0, 1.0]".into(),
            ));
        }
        if !(self.repeat_penalty >= 1.0 && self.repeat_penalty.is_finite()) {
            return Err(GenerationError::InvalidRequest(
                "repeat_penalty must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// One generation call. Consumed by `generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_new_tokens: usize,
    pub stop_sequences: Vec<String>,
    pub sampling: SamplingParams,
    /// Wall-time limit; `None` uses the session default.
    #[serde(with = "opt_millis")]
    pub timeout: Option<Duration>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_new_tokens: 256,
            stop_sequences: Vec::new(),
            sampling: SamplingParams::default(),
            timeout: None,
        }
    }
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_new_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens,
            ..Self::default()
        }
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        self.sampling.validate()?;
        if self.stop_sequences.len() > MAX_STOP_SEQUENCES {
            return Err(GenerationError::InvalidRequest(format!(
                "at most {MAX_STOP_SEQUENCES} stop sequences allowed"
            )));
        }
        for stop in &self.stop_sequences {
            if stop.is_empty() {
                return Err(GenerationError::InvalidRequest("stop sequence is empty".into()));
            }
            if stop.len() > MAX_STOP_SEQUENCE_BYTES {
                return Err(GenerationError::InvalidRequest(format!(
                    "stop sequence exceeds {MAX_STOP_SEQUENCE_BYTES} bytes"
                )));
            }
        }
        Ok(())
    }
}

/// `Option<Duration>` as integer milliseconds.
mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
