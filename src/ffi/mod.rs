// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! C ABI over an opaque `Bridge` pointer.
//!
//! Every entry point catches unwinds; no panic crosses the boundary. Strings
//! returned to the caller are owned and must be released with
//! `llm_bridge_free_string`.

mod bridge;
mod error;

pub use bridge::{
    llm_bridge_cancel, llm_bridge_cleanup, llm_bridge_create, llm_bridge_destroy,
    llm_bridge_free_string, llm_bridge_generate_response, llm_bridge_get_model_info,
    llm_bridge_is_model_loaded, llm_bridge_load_model,
};
pub use error::{llm_bridge_clear_last_error, llm_bridge_last_error, BridgeErrorCode};
