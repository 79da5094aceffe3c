//! Bridge facade tests: the string/bool surface seen by the host app.

mod common;

use llm_bridge::bridge::ERROR_PREFIX;
use llm_bridge::{Bridge, FinishReason};

use common::{ascii_model, config, greedy_request, tiny_model};

fn bridge() -> Bridge {
    Bridge::new(config(64))
}

#[test]
fn test_generate_without_model_returns_error_string() {
    let bridge = bridge();
    let reply = bridge.generate_response("Hello", 8);
    assert!(reply.starts_with(ERROR_PREFIX), "{reply}");
    assert_eq!(reply, "Error: No model loaded");
}

#[test]
fn test_load_model_reports_success() {
    let fixture = tiny_model();
    let bridge = bridge();
    assert!(!bridge.is_model_loaded());
    assert!(bridge.load_model(&fixture.path));
    assert!(bridge.is_model_loaded());
}

#[test]
fn test_load_missing_model_reports_failure() {
    let bridge = bridge();
    assert!(!bridge.load_model("/definitely/not/here.gguf"));
    assert!(!bridge.is_model_loaded());
}

#[test]
fn test_model_info_strings() {
    let fixture = tiny_model();
    let bridge = bridge();
    assert_eq!(bridge.get_model_info(), "No model loaded");

    bridge.load_model(&fixture.path);
    let info = bridge.get_model_info();
    assert!(info.starts_with("Model loaded: synth-tiny (llama, F32, "), "{info}");
    assert!(info.ends_with(&fixture.path.display().to_string()), "{info}");
}

#[test]
fn test_non_positive_budget_returns_empty() {
    let fixture = tiny_model();
    let bridge = bridge();
    bridge.load_model(&fixture.path);
    assert_eq!(bridge.generate_response("Hello", 0), "");
    assert_eq!(bridge.generate_response("Hello", -5), "");
}

#[test]
fn test_each_response_starts_from_fresh_session() {
    let fixture = tiny_model();
    let bridge = bridge();
    bridge.load_model(&fixture.path);

    let first = bridge.generate_response("Hello", 12);
    let second = bridge.generate_response("Hello", 12);
    assert!(!first.starts_with(ERROR_PREFIX), "{first}");
    assert_eq!(first, second);
}

#[test]
fn test_prompt_with_unknown_characters() {
    let fixture = common::write_model(&llm_bridge::models::synth::SynthSpec {
        byte_fallback: false,
        ..Default::default()
    });
    let bridge = bridge();
    bridge.load_model(&fixture.path);
    // The synthetic vocabulary has an unknown token, so this still works.
    let reply = bridge.generate_response("héllo", 4);
    assert!(!reply.starts_with(ERROR_PREFIX), "{reply}");
}

#[test]
fn test_cancel_when_idle() {
    let bridge = bridge();
    assert!(!bridge.cancel());
}

#[test]
fn test_cleanup_is_idempotent() {
    let fixture = tiny_model();
    let bridge = bridge();
    bridge.load_model(&fixture.path);
    bridge.generate_response("Hello", 4);

    assert!(bridge.cleanup());
    assert!(bridge.cleanup());
    assert!(!bridge.is_model_loaded());
    assert_eq!(bridge.get_model_info(), "No model loaded");
    assert_eq!(bridge.generate_response("Hello", 4), "Error: No model loaded");
}

#[test]
fn test_reload_after_cleanup() {
    let fixture = tiny_model();
    let bridge = bridge();
    bridge.load_model(&fixture.path);
    let before = bridge.generate_response("Hello", 6);
    assert!(bridge.cleanup());

    assert!(bridge.load_model(&fixture.path));
    assert_eq!(bridge.generate_response("Hello", 6), before);
}

#[test]
fn test_cleanup_reports_busy_session() {
    let fixture = ascii_model();
    let bridge = bridge();
    bridge.load_model(&fixture.path);
    let mut nested = None;

    // The callback runs with the session locked, so cleanup cannot finish.
    let result = bridge
        .session()
        .generate(&greedy_request("Hello", 16), |_| {
            if nested.is_none() {
                nested = Some(bridge.cleanup());
            }
        })
        .unwrap();
    assert_eq!(nested, Some(false));
    assert_eq!(result.finish_reason, FinishReason::Cancelled);
    assert!(bridge.is_model_loaded());

    assert!(bridge.cleanup());
    assert!(!bridge.is_model_loaded());
}
