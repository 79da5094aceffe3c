//! Metric recording helpers over the `metrics` facade.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::engine::FinishReason;

pub fn record_model_loaded(size_bytes: u64) {
    counter!("llm_bridge_models_loaded_total").increment(1);
    gauge!("llm_bridge_model_bytes").set(size_bytes as f64);
}

pub fn record_model_unloaded() {
    counter!("llm_bridge_models_unloaded_total").increment(1);
    gauge!("llm_bridge_model_bytes").set(0.0);
}

pub fn record_generation(reason: FinishReason, tokens: usize, latency: Duration) {
    counter!("llm_bridge_generations_total", "finish_reason" => reason.as_str()).increment(1);
    counter!("llm_bridge_tokens_generated_total").increment(tokens as u64);
    histogram!("llm_bridge_generation_latency_seconds").record(latency.as_secs_f64());
}

pub fn record_generation_failure(kind: &'static str) {
    counter!("llm_bridge_generation_failures_total", "kind" => kind).increment(1);
}
