//! Telemetry: structured logging, generation spans and metrics.
//!
//! Metrics go through the `metrics` facade; the host process installs
//! whatever recorder it wants. Nothing here opens a network socket.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat, DEFAULT_LOG_FILTER};
pub use metrics::{record_generation, record_generation_failure, record_model_loaded, record_model_unloaded};
pub use spans::{GenerationSpan, SpanExt};
