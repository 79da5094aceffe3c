//! Fuzz target for GGUF header parsing.
//!
//! Arbitrary bytes must never panic the parser or yield tensors that point
//! outside the buffer.

#![no_main]

use libfuzzer_sys::fuzz_target;
use llm_bridge::models::gguf;

fuzz_target!(|data: &[u8]| {
    if let Ok(file) = gguf::parse(data) {
        for t in &file.tensors {
            let n = usize::try_from(t.n_elements()).unwrap();
            let bytes = t.ty.bytes_for(n).unwrap();
            let start = file.data_offset + t.offset as usize;
            assert!(start + bytes <= data.len(), "tensor {} out of bounds", t.name);
        }
    }
});
