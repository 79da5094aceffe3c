//! Fuzz target for stop-sequence matching over chunked text.
//!
//! Emitted text must never contain a stop sequence, and without a match the
//! emitted text plus the final flush must equal the input.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use llm_bridge::engine::{StopMatcher, StopOutcome};

#[derive(Debug, Arbitrary)]
struct Input {
    stops: Vec<String>,
    chunks: Vec<String>,
}

fuzz_target!(|input: Input| {
    let stops: Vec<String> = input.stops.into_iter().filter(|s| !s.is_empty()).take(16).collect();
    let Ok(mut matcher) = StopMatcher::new(&stops) else {
        return;
    };

    let mut emitted = String::new();
    let mut stopped = false;
    for chunk in &input.chunks {
        match matcher.push(chunk) {
            StopOutcome::Emit(text) => emitted.push_str(&text),
            StopOutcome::Stop(text) => {
                emitted.push_str(&text);
                stopped = true;
                break;
            }
        }
    }
    for stop in &stops {
        assert!(!emitted.contains(stop.as_str()), "stop {stop:?} leaked");
    }
    if !stopped {
        emitted.push_str(&matcher.flush());
        assert_eq!(emitted, input.chunks.concat());
    }
});
