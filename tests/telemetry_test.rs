//! Telemetry tests: log configuration and span helpers.

use llm_bridge::telemetry::{
    init_logging, GenerationSpan, LogConfig, LogError, LogFormat, SpanExt, DEFAULT_LOG_FILTER,
};

// ============================================================================
// Log configuration
// ============================================================================

#[test]
fn test_log_format_parsing() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert!(matches!("xml".parse::<LogFormat>(), Err(LogError::InvalidFormat(f)) if f == "xml"));
}

#[test]
fn test_log_config_defaults() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, DEFAULT_LOG_FILTER);
    assert!(config.level.contains("llm_bridge=info"));
    assert!(config.output_path.is_none());
}

#[test]
fn test_log_config_from_toml() {
    let config: LogConfig = toml::from_str("format = \"pretty\"\nlevel = \"llm_bridge=debug\"").unwrap();
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.level, "llm_bridge=debug");
}

#[test]
fn test_invalid_filter_rejected() {
    let config = LogConfig { level: "llm_bridge=loud".to_string(), ..LogConfig::default() };
    assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
}

#[test]
fn test_unwritable_log_path_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        output_path: Some(dir.path().join("missing").join("bridge.log")),
        ..LogConfig::default()
    };
    assert!(matches!(init_logging(&config), Err(LogError::FileOpen(msg)) if msg.contains("bridge.log")));
}

#[test]
fn test_second_init_reports_already_initialized() {
    let config = LogConfig { format: LogFormat::Pretty, ..LogConfig::default() };
    // Only this test installs a subscriber in this binary.
    init_logging(&config).unwrap();
    assert!(matches!(init_logging(&config), Err(LogError::AlreadyInitialized)));
}

// ============================================================================
// Spans
// ============================================================================

#[test]
fn test_generation_span_records_outcomes() {
    let span = GenerationSpan::new("req-1", "synth-tiny");
    let _enter = span.enter();
    span.record("tokens_generated", 3);
    span.record_result::<(), String>(&Ok(()));
    span.record_result::<(), String>(&Err("boom".to_string()));
}
