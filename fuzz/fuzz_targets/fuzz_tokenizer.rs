//! Fuzz target for tokenizer encode/decode.
//!
//! With byte fallback every string must survive a round trip, and streaming
//! decode must agree with whole-sequence decode.

#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use llm_bridge::engine::{StreamDecoder, Tokenizer, Vocabulary};
use llm_bridge::models::synth;

fn tokenizer() -> &'static Tokenizer {
    static TOKENIZER: OnceLock<Tokenizer> = OnceLock::new();
    TOKENIZER.get_or_init(|| {
        let (tokens, kinds) = synth::vocabulary(true).into_iter().unzip();
        Tokenizer::new(Vocabulary {
            tokens,
            kinds,
            bos: Some(1),
            eos: Some(2),
            unk: Some(0),
            space_marker: true,
        })
        .unwrap()
    })
}

fuzz_target!(|text: &str| {
    let tok = tokenizer();
    let ids = tok.encode(text).unwrap();
    assert_eq!(tok.decode(&ids).unwrap(), text);

    let mut decoder = StreamDecoder::new();
    let streamed: String = ids.iter().map(|&id| decoder.push(tok, id).unwrap().text).collect();
    assert_eq!(streamed, text);
});
