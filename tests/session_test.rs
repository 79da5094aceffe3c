//! Session manager tests: lifecycle, serialization, error mapping.

mod common;

use std::time::Duration;

use llm_bridge::models::synth::SynthSpec;
use llm_bridge::{
    ContextParams, ErrorKind, FinishReason, GenerationRequest, OverflowPolicy, SessionError,
    SessionManager,
};

use common::{ascii_model, config, greedy_request, loaded_manager, tiny_model, write_model, TRAIN_CTX};

// ============================================================================
// Model lifecycle
// ============================================================================

#[test]
fn test_fresh_manager_has_no_model() {
    let manager = SessionManager::new(config(64));
    assert!(!manager.is_model_loaded());
    assert!(manager.model_info().is_none());
    assert_eq!(manager.session_position(), None);
    assert_eq!(
        manager.generate(&greedy_request("Hello", 4), |_| {}).unwrap_err(),
        SessionError::NotLoaded
    );
}

#[test]
fn test_load_and_unload() {
    let fixture = tiny_model();
    let manager = SessionManager::new(config(64));

    let info = manager.load_model(&fixture.path).unwrap();
    assert_eq!(info.name, "synth-tiny");
    assert!(manager.is_model_loaded());
    assert_eq!(manager.model_info().unwrap().path, fixture.path);

    assert!(manager.unload_model().unwrap());
    assert!(!manager.is_model_loaded());
    assert!(!manager.unload_model().unwrap(), "second unload reports nothing to do");
}

#[test]
fn test_load_replaces_previous_model() {
    let first = tiny_model();
    let second = write_model(&SynthSpec { name: "second".to_string(), ..SynthSpec::default() });
    let manager = loaded_manager(&first);
    manager.generate(&greedy_request("Hello", 2), |_| {}).unwrap();
    assert!(manager.session_position().unwrap() > 0);

    manager.load_model(&second.path).unwrap();
    assert_eq!(manager.model_info().unwrap().name, "second");
    assert_eq!(manager.session_position(), None, "old session is destroyed");
}

#[test]
fn test_failed_load_keeps_current_model() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    let missing = fixture.path.with_file_name("missing.gguf");

    let err = manager.load_model(&missing).unwrap_err();
    assert!(matches!(err, SessionError::FileNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert!(manager.is_model_loaded());
}

#[test]
fn test_load_garbage_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.gguf");
    std::fs::write(&path, vec![7u8; 4096]).unwrap();

    let manager = SessionManager::new(config(64));
    let err = manager.load_model(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatError);
}

#[test]
fn test_model_size_limit_is_out_of_memory() {
    let fixture = tiny_model();
    let mut cfg = config(64);
    cfg.max_model_bytes = Some(512);
    let manager = SessionManager::new(cfg);
    let err = manager.load_model(&fixture.path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
}

#[test]
fn test_cleanup_is_idempotent() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    manager.generate(&greedy_request("Hello", 2), |_| {}).unwrap();

    manager.cleanup().unwrap();
    manager.cleanup().unwrap();
    assert!(!manager.is_model_loaded());
    assert_eq!(
        manager.generate(&greedy_request("Hello", 2), |_| {}).unwrap_err(),
        SessionError::NotLoaded
    );
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn test_create_session_requires_model() {
    let manager = SessionManager::new(config(64));
    let err = manager.create_session(&ContextParams::with_window(32)).unwrap_err();
    assert_eq!(err, SessionError::NotLoaded);
}

#[test]
fn test_create_session_window_limits() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);

    for window in [0, TRAIN_CTX + 1] {
        let err = manager.create_session(&ContextParams::with_window(window)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidWindowSize, "window {window}");
    }
    manager.create_session(&ContextParams::with_window(TRAIN_CTX)).unwrap();
    assert_eq!(manager.session_position(), Some(0));
}

#[test]
fn test_generation_creates_session_lazily() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    assert_eq!(manager.session_position(), None);

    let result = manager.generate(&greedy_request("Hello", 3), |_| {}).unwrap();
    assert_eq!(manager.session_position(), Some(result.prompt_tokens + 3));
}

#[test]
fn test_reset_session_matches_fresh_session() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    let first = manager.generate(&greedy_request("Hello", 6), |_| {}).unwrap();

    manager.reset_session().unwrap();
    assert_eq!(manager.session_position(), Some(0));
    let again = manager.generate(&greedy_request("Hello", 6), |_| {}).unwrap();
    assert_eq!(first.tokens, again.tokens);
}

#[test]
fn test_reset_without_session_is_ok() {
    let manager = SessionManager::new(config(64));
    manager.reset_session().unwrap();
}

#[test]
fn test_session_overflow_error() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    let params = ContextParams {
        window_size: 8,
        overflow: OverflowPolicy::Fail,
        ..ContextParams::default()
    };
    manager.create_session(&params).unwrap();

    let err = manager.generate(&greedy_request("Hello", 16), |_| {}).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextOverflow);
    assert_eq!(manager.session_position(), Some(0));
}

#[test]
fn test_invalid_request_error() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    let err = manager
        .generate(&greedy_request("Hello", 4).with_stop(""), |_| {})
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidRequest(_)));
}

// ============================================================================
// Serialization and cancellation
// ============================================================================

#[test]
fn test_overlapping_generation_is_busy() {
    let fixture = ascii_model();
    let manager = loaded_manager(&fixture);
    let mut nested = None;

    manager
        .generate(&greedy_request("Hello", 16), |_| {
            if nested.is_none() {
                nested = Some(manager.generate(&greedy_request("Hi", 2), |_| {}));
            }
        })
        .unwrap();
    assert!(matches!(nested, Some(Err(SessionError::Busy))));
}

#[test]
fn test_unload_during_generation_times_out_busy() {
    let fixture = ascii_model();
    let manager = loaded_manager(&fixture);
    let mut nested = None;

    manager
        .generate(&greedy_request("Hello", 16), |_| {
            if nested.is_none() {
                nested = Some(manager.unload_model());
            }
        })
        .unwrap();
    assert_eq!(nested, Some(Err(SessionError::Busy)));
    assert!(manager.is_model_loaded());
}

#[test]
fn test_cancel_during_generation() {
    let fixture = ascii_model();
    let manager = loaded_manager(&fixture);
    let mut cancelled = false;

    let result = manager
        .generate(&greedy_request("Hello", 32), |_| {
            cancelled |= manager.cancel();
        })
        .unwrap();
    if cancelled {
        assert_eq!(result.finish_reason, FinishReason::Cancelled);
        assert_eq!(result.fragments.len(), 1);
    }
    assert!(!manager.cancel(), "nothing in flight afterwards");
}

#[test]
fn test_cancel_when_idle() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    assert!(!manager.cancel());
}

#[test]
fn test_request_timeout() {
    let fixture = tiny_model();
    let manager = loaded_manager(&fixture);
    let request = greedy_request("Hello", 8).with_timeout(Duration::ZERO);
    let result = manager.generate(&request, |_| {}).unwrap();
    assert_eq!(result.finish_reason, FinishReason::TimedOut);
}

#[test]
fn test_configured_timeout_applies_when_request_has_none() {
    let fixture = tiny_model();
    let mut cfg = config(64);
    cfg.generation_timeout_ms = 3_600_000;
    let manager = SessionManager::new(cfg);
    manager.load_model(&fixture.path).unwrap();

    let result = manager.generate(&GenerationRequest::new("Hello", 4), |_| {}).unwrap();
    assert!(!result.finish_reason.is_interrupted());
}

// ============================================================================
// Error codes
// ============================================================================

#[test]
fn test_error_kind_codes_are_stable() {
    assert_eq!(ErrorKind::FileNotFound as i32, 1);
    assert_eq!(ErrorKind::FormatError as i32, 2);
    assert_eq!(ErrorKind::OutOfMemory as i32, 3);
    assert_eq!(ErrorKind::InvalidModel as i32, 4);
    assert_eq!(ErrorKind::InvalidWindowSize as i32, 5);
    assert_eq!(ErrorKind::ContextOverflow as i32, 6);
    assert_eq!(ErrorKind::Busy as i32, 7);
    assert_eq!(ErrorKind::Cancelled as i32, 8);
    assert_eq!(ErrorKind::TimedOut as i32, 9);
    assert_eq!(ErrorKind::NotLoaded as i32, 10);
    assert_eq!(ErrorKind::InvalidRequest as i32, 11);
}

#[test]
fn test_error_messages() {
    assert_eq!(SessionError::NotLoaded.to_string(), "No model loaded");
    assert_eq!(
        SessionError::FileNotFound("/x.gguf".into()).to_string(),
        "Model file not found: /x.gguf"
    );
}
