//! Span helpers for generation requests.

use tracing::{info_span, Span};

/// Extension trait for recording outcomes into spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the `generation` span.
pub struct GenerationSpan;

impl GenerationSpan {
    /// Fields `prompt_tokens`, `tokens_generated`, `finish_reason`,
    /// `latency_ms`, `status` and `error.message` are filled in as the call
    /// progresses.
    pub fn new(request_id: &str, model: &str) -> Span {
        info_span!(
            "generation",
            request_id = %request_id,
            model = %model,
            prompt_tokens = tracing::field::Empty,
            tokens_generated = tracing::field::Empty,
            finish_reason = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
